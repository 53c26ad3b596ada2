//! Delivery of finished analysis payloads to the KPI backend

use peg_analyzer_types::{AnalyzerError, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Outcome of a backend POST
#[derive(Debug, Clone)]
pub struct BackendPostResult {
    pub status: u16,
    pub body: Option<Value>,
}

/// Thin client for `POST`ing the backend payload
///
/// Retries server errors and network failures with a short fixed delay;
/// client errors surface immediately. Payload contents are never logged.
pub struct BackendClient {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl BackendClient {
    pub fn new(url: impl Into<String>, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("peg-analyzer/0.1")
            .build()
            .map_err(|e| AnalyzerError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            max_retries,
        })
    }

    pub async fn post(&self, payload: &Value) -> Result<BackendPostResult> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                sleep(Duration::from_millis(500)).await;
            }

            match self.client.post(&self.url).json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        warn!(%status, attempt, "Backend server error");
                        last_error = format!("server error {status}");
                        continue;
                    }
                    if !status.is_success() {
                        return Err(AnalyzerError::internal(format!(
                            "backend rejected payload: {status}"
                        )));
                    }
                    let body = response.json::<Value>().await.ok();
                    info!(status = status.as_u16(), "Backend payload delivered");
                    return Ok(BackendPostResult {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Backend request failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(AnalyzerError::internal(format!(
            "backend unreachable after {} attempts: {last_error}",
            self.max_retries + 1
        )))
    }
}
