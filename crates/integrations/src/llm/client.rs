//! LLM completion client with retry, backoff and endpoint failover

use super::mock::mock_completion;
use super::types::{ChatMessage, ChatRequest, ChatResponse, Completion};
use super::CompletionBackend;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use peg_analyzer_types::{AnalyzerError, Result};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Marker appended to prompts cut down to the character cap
const TRUNCATION_MARKER: &str = "[truncated]";

/// Client options; every knob mirrors a configuration entry
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Base URLs tried in order
    pub endpoints: Vec<String>,
    /// Model identifier passed verbatim
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Attempts per endpoint before failing over
    pub max_retries: u32,
    /// Multiplier for exponential backoff, seconds
    pub backoff_base: f64,
    /// Bypass the network and return canned text
    pub mock: bool,
    pub rate_limit_per_minute: u32,
    /// Hard cap on prompt length in characters
    pub max_prompt_chars: usize,
    /// Headroom left when a prompt is cut down to the cap
    pub truncate_buffer: usize,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:10000".to_string()],
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout: Duration::from_secs(180),
            max_retries: 3,
            backoff_base: 1.0,
            mock: false,
            rate_limit_per_minute: 60,
            max_prompt_chars: 80_000,
            truncate_buffer: 500,
        }
    }
}

enum AttemptError {
    /// Worth another attempt on this endpoint: 429, 5xx, network, bad body
    Retryable(String),
    /// Client error; no further attempts at this endpoint, fail over
    Fatal(String),
}

/// Multi-endpoint LLM client
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    options: LlmOptions,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::direct::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl LlmClient {
    pub fn new(options: LlmOptions) -> Result<Self> {
        if options.endpoints.is_empty() {
            return Err(AnalyzerError::internal("LLM client needs at least one endpoint"));
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent("peg-analyzer/0.1")
            .build()
            .map_err(|e| AnalyzerError::internal(format!("failed to create HTTP client: {e}")))?;

        let rate_limit = NonZeroU32::new(options.rate_limit_per_minute.max(1))
            .ok_or_else(|| AnalyzerError::internal("rate limit must be greater than 0"))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rate_limit)));

        info!(
            endpoints = options.endpoints.len(),
            model = %options.model,
            mock = options.mock,
            "Initialized LLM client"
        );

        Ok(Self {
            client,
            options,
            rate_limiter,
        })
    }

    /// Tighten the prompt character cap, e.g. from a per-request token budget.
    pub fn with_prompt_cap(mut self, max_prompt_chars: usize) -> Self {
        self.options.max_prompt_chars = self.options.max_prompt_chars.min(max_prompt_chars);
        self
    }

    /// Rough token estimate at ~4 characters per token.
    pub fn estimate_tokens(text: &str) -> u32 {
        (text.len() as f32 / 4.0).ceil() as u32
    }

    /// Enforce the character cap, appending an explicit marker on cut.
    fn truncate_prompt(&self, prompt: &str) -> String {
        let cap = self.options.max_prompt_chars;
        if prompt.len() <= cap {
            return prompt.to_string();
        }
        let keep = cap.saturating_sub(self.options.truncate_buffer);
        // back off to a char boundary so the cut never splits a code point
        let mut cut = keep.min(prompt.len());
        while cut > 0 && !prompt.is_char_boundary(cut) {
            cut -= 1;
        }
        warn!(
            original_chars = prompt.len(),
            kept_chars = cut,
            "Prompt exceeds cap, truncating"
        );
        format!("{}{}", &prompt[..cut], TRUNCATION_MARKER)
    }

    /// GET `/health` on one endpoint; used by the doctor command.
    pub async fn health_check(&self, endpoint: &str) -> bool {
        match self
            .client
            .get(format!("{endpoint}/health"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(endpoint, status = %response.status(), "LLM endpoint unhealthy");
                false
            }
            Err(e) => {
                warn!(endpoint, error = %e, "LLM endpoint unreachable");
                false
            }
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.options.endpoints
    }

    async fn try_endpoint(
        &self,
        endpoint: &str,
        request: &ChatRequest,
    ) -> std::result::Result<(String, Option<String>), AttemptError> {
        let url = format!("{endpoint}/v1/chat/completions");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AttemptError::Retryable("rate limited by endpoint".to_string()));
        }
        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!("server error {status}")));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(format!("client error {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Retryable(format!("unparseable response body: {e}")))?;
        let text = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| AttemptError::Retryable("response contained no choices".to_string()))?;
        Ok((text, parsed.model))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.options.backoff_base * 2f64.powi(attempt as i32 - 1);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
        Duration::from_secs_f64(base + jitter)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    /// Complete a prompt, trying each endpoint in order.
    ///
    /// Per endpoint, up to `max_retries` attempts with exponential backoff
    /// and jitter; 429/5xx/network errors retry, other 4xx skip straight
    /// to the next endpoint without retrying. Only after every endpoint is
    /// exhausted does the call fail, carrying the full attempt trail.
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        if self.options.mock {
            return Ok(mock_completion());
        }

        let prompt = self.truncate_prompt(prompt);
        debug!(prompt_chars = prompt.len(), "Dispatching LLM request");

        self.rate_limiter.until_ready().await;

        let request = ChatRequest {
            model: self.options.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let mut attempted: Vec<String> = Vec::new();
        let mut last_error = String::from("no endpoints attempted");

        for endpoint in &self.options.endpoints {
            attempted.push(endpoint.clone());

            for attempt in 0..self.options.max_retries {
                if attempt > 0 {
                    let delay = self.backoff_delay(attempt);
                    debug!(%endpoint, attempt, ?delay, "Retrying after backoff");
                    sleep(delay).await;
                }

                match self.try_endpoint(endpoint, &request).await {
                    Ok((text, model)) => {
                        info!(
                            %endpoint,
                            response_chars = text.len(),
                            "LLM completion succeeded"
                        );
                        return Ok(Completion {
                            text,
                            endpoint: endpoint.clone(),
                            endpoints_attempted: attempted,
                            model,
                        });
                    }
                    Err(AttemptError::Fatal(message)) => {
                        warn!(%endpoint, %message, "Fatal LLM error, failing over");
                        last_error = message;
                        break;
                    }
                    Err(AttemptError::Retryable(message)) => {
                        warn!(%endpoint, attempt, %message, "Retryable LLM error");
                        last_error = message;
                    }
                }
            }

            info!(%endpoint, "Endpoint exhausted, failing over");
        }

        Err(AnalyzerError::LlmUnavailable {
            message: last_error,
            endpoints_attempted: attempted,
        })
    }
}
