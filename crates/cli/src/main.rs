//! PEG analyzer CLI
//!
//! Reads one analysis request (a JSON document) from a file or stdin, runs
//! the pipeline against the configured collaborators and prints the result
//! envelope on stdout. Exit codes: 0 success, 2 validation error, 3 store
//! error, 4 LLM error, 1 anything else.

use clap::{Parser, Subcommand};
use colored::Colorize;
use peg_analyzer_analysis::payload::build_backend_payload;
use peg_analyzer_analysis::{response, validate_request, AnalysisAssembler};
use peg_analyzer_config::AnalyzerConfig;
use peg_analyzer_integrations::{BackendClient, LlmClient, LlmOptions, PromptTemplateStore};
use peg_analyzer_store::{MemorySource, PegStore, SampleSource, StoreOptions};
use peg_analyzer_types::request::AnalysisRequest;
use peg_analyzer_types::AnalyzerError;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "peg-analyzer",
    version,
    about = "LLM-assisted N-1 vs N comparison analysis for 5G cell PEG data"
)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true, env = "PEG_ANALYZER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one analysis from a JSON request document
    Analyze {
        /// Request file; '-' reads stdin
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// Abort the analysis after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// Deliver the backend payload to the configured backend URL
        #[arg(long)]
        post: bool,
    },

    /// Check connectivity of the configured collaborators
    Doctor,

    /// List the prompt types the template document provides
    Templates,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AnalyzerConfig::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    init_tracing(&config, cli.verbose);

    let code = match cli.command {
        Commands::Analyze {
            request,
            timeout_secs,
            post,
        } => run_analyze(&config, &request, timeout_secs, post).await,
        Commands::Doctor => run_doctor(&config).await,
        Commands::Templates => run_templates(&config),
    };
    std::process::exit(code);
}

fn init_tracing(config: &AnalyzerConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.observability.log_level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.observability.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

fn read_request_text(path: &PathBuf) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path)
    }
}

fn fail(error: &AnalyzerError) -> i32 {
    let envelope = response::error_envelope(error);
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    eprintln!("{} {}", "Error:".red().bold(), error);
    response::exit_code(error)
}

async fn build_store(
    config: &AnalyzerConfig,
    request: &AnalysisRequest,
) -> Result<Arc<dyn SampleSource>, AnalyzerError> {
    match &request.db {
        Some(db) => {
            let options = StoreOptions {
                pool_size: config.database.pool_size,
                connect_timeout: Duration::from_secs(config.database.connect_timeout_secs),
                fetch_limit: config.database.fetch_limit,
                max_retries: config.database.max_retries,
                retry_delay: Duration::from_millis(config.database.retry_delay_ms),
            };
            let store = PegStore::connect(&db.connection_url(), &request.table, options).await?;
            Ok(Arc::new(store))
        }
        None => {
            // mock mode without a database runs against an empty source
            info!("No database supplied; using an empty in-memory source");
            Ok(Arc::new(MemorySource::empty()))
        }
    }
}

fn build_llm(config: &AnalyzerConfig, request: &AnalysisRequest) -> Result<LlmClient, AnalyzerError> {
    let llm = &config.llm;
    let mut client = LlmClient::new(LlmOptions {
        endpoints: llm.endpoints.clone(),
        model: llm.model.clone(),
        temperature: llm.temperature,
        max_tokens: llm.max_tokens,
        timeout: Duration::from_secs(llm.timeout_secs),
        max_retries: llm.max_retries,
        backoff_base: llm.backoff_base,
        mock: request.enable_mock,
        rate_limit_per_minute: llm.rate_limit_per_minute,
        max_prompt_chars: llm.max_prompt_chars,
        truncate_buffer: llm.truncate_buffer,
    })?;
    if let Some(tokens) = request.max_prompt_tokens {
        // ~4 characters per token
        client = client.with_prompt_cap(tokens as usize * 4);
    }
    Ok(client)
}

async fn run_analyze(
    config: &AnalyzerConfig,
    request_path: &PathBuf,
    timeout_secs: Option<u64>,
    post: bool,
) -> i32 {
    let started = Instant::now();

    let text = match read_request_text(request_path) {
        Ok(text) => text,
        Err(e) => {
            return fail(&AnalyzerError::RequestInvalid {
                field: "request".to_string(),
                reason: format!("cannot read {}: {e}", request_path.display()),
            })
        }
    };
    let raw: serde_json::Value = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            return fail(&AnalyzerError::RequestInvalid {
                field: "request".to_string(),
                reason: format!("request is not valid JSON: {e}"),
            })
        }
    };

    let validated = match validate_request(&raw) {
        Ok(validated) => validated,
        Err(e) => return fail(&e),
    };
    info!(
        analysis_type = validated.request.analysis_type.as_str(),
        mock = validated.request.enable_mock,
        "Request accepted"
    );

    let store = match build_store(config, &validated.request).await {
        Ok(store) => store,
        Err(e) => return fail(&e),
    };
    let llm = match build_llm(config, &validated.request) {
        Ok(llm) => llm,
        Err(e) => return fail(&e),
    };
    let templates = match PromptTemplateStore::load(config.prompt.template_path.clone()) {
        Ok(templates) => templates,
        Err(e) => return fail(&e),
    };

    let assembler = AnalysisAssembler::new(
        store,
        Arc::new(llm),
        Arc::new(templates),
        config.clone(),
    );

    let deadline = timeout_secs.map(Duration::from_secs);
    let mut result = match assembler
        .analyze(validated.request.clone(), validated.warnings, deadline)
        .await
    {
        Ok(result) => result,
        Err(e) => return fail(&e),
    };

    if post {
        match &config.backend.url {
            Some(url) => {
                let payload = build_backend_payload(&result, &validated.request);
                let payload = match serde_json::to_value(&payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        return fail(&AnalyzerError::internal(format!(
                            "payload serialization failed: {e}"
                        )))
                    }
                };
                match BackendClient::new(
                    url.clone(),
                    Duration::from_secs(config.backend.timeout_secs),
                    config.backend.max_retries,
                ) {
                    Ok(client) => {
                        if let Err(e) = client.post(&payload).await {
                            warn!(error = %e, "Backend delivery failed");
                            result
                                .metadata
                                .warnings
                                .push(format!("backend delivery failed: {e}"));
                        }
                    }
                    Err(e) => {
                        result
                            .metadata
                            .warnings
                            .push(format!("backend client unavailable: {e}"));
                    }
                }
            }
            None => {
                warn!("--post given but no backend URL configured");
                result
                    .metadata
                    .warnings
                    .push("backend delivery skipped: no backend URL configured".to_string());
            }
        }
    }

    let envelope = response::success_envelope(&result, started.elapsed().as_millis());
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    0
}

async fn run_doctor(config: &AnalyzerConfig) -> i32 {
    let mut healthy = true;

    match PromptTemplateStore::load(config.prompt.template_path.clone()) {
        Ok(store) => {
            println!(
                "{} templates loaded ({})",
                "ok".green().bold(),
                store.available().join(", ")
            );
        }
        Err(e) => {
            healthy = false;
            println!("{} templates: {e}", "fail".red().bold());
        }
    }

    match LlmClient::new(LlmOptions {
        endpoints: config.llm.endpoints.clone(),
        model: config.llm.model.clone(),
        ..LlmOptions::default()
    }) {
        Ok(client) => {
            for endpoint in client.endpoints().to_vec() {
                if client.health_check(&endpoint).await {
                    println!("{} llm endpoint {endpoint}", "ok".green().bold());
                } else {
                    healthy = false;
                    println!("{} llm endpoint {endpoint}", "fail".red().bold());
                }
            }
        }
        Err(e) => {
            healthy = false;
            println!("{} llm client: {e}", "fail".red().bold());
        }
    }

    let url = format!(
        "postgresql://{}:{}@{}:{}/{}",
        config.database.user,
        config.database.password,
        config.database.host,
        config.database.port,
        config.database.dbname
    );
    let options = StoreOptions {
        pool_size: 1,
        connect_timeout: Duration::from_secs(5),
        ..StoreOptions::default()
    };
    match PegStore::connect(&url, "summary", options).await {
        Ok(store) => match store.health_check().await {
            Ok(()) => println!("{} database {}", "ok".green().bold(), config.database.host),
            Err(e) => {
                healthy = false;
                println!("{} database: {e}", "fail".red().bold());
            }
        },
        Err(e) => {
            healthy = false;
            println!("{} database: {e}", "fail".red().bold());
        }
    }

    if healthy {
        0
    } else {
        1
    }
}

fn run_templates(config: &AnalyzerConfig) -> i32 {
    match PromptTemplateStore::load(config.prompt.template_path.clone()) {
        Ok(store) => {
            for prompt_type in store.available() {
                println!("{prompt_type}");
            }
            0
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            1
        }
    }
}
