//! Configuration management for the PEG analyzer
//!
//! Loaded once at startup from an optional YAML file merged with
//! `PEG_ANALYZER_*` environment variables, then validated and treated as
//! immutable for the life of the process.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main analyzer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Database connection defaults (overridable per request)
    pub database: DatabaseConfig,

    /// LLM client settings
    pub llm: LlmSettings,

    /// Prompt template settings
    pub prompt: PromptSettings,

    /// Comparison thresholds and time handling
    pub analysis: AnalysisSettings,

    /// Downstream persistence endpoint
    pub backend: BackendSettings,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

impl AnalyzerConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Environment variables are prefixed with `PEG_ANALYZER_` and nested
    /// with `__`, e.g. `PEG_ANALYZER_LLM__TIMEOUT_SECS=300`.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("PEG_ANALYZER_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every knob; called once after load
    pub fn validate(&self) -> Result<()> {
        if self.database.port == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid database port".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "Database pool size must be at least 1".to_string(),
            ));
        }
        if self.database.fetch_limit == 0 {
            return Err(ConfigError::ValidationError(
                "Fetch limit must be at least 1".to_string(),
            ));
        }
        if self.llm.endpoints.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one LLM endpoint is required".to_string(),
            ));
        }
        if self.llm.model.is_empty() {
            return Err(ConfigError::ValidationError(
                "LLM model identifier is required".to_string(),
            ));
        }
        if self.llm.max_prompt_chars <= self.llm.truncate_buffer {
            return Err(ConfigError::ValidationError(
                "max_prompt_chars must exceed truncate_buffer".to_string(),
            ));
        }
        if self.prompt.preview_rows == 0 {
            return Err(ConfigError::ValidationError(
                "Prompt preview must include at least one row".to_string(),
            ));
        }
        if self.analysis.trend_threshold_pct < 0.0
            || self.analysis.significant_threshold_pct < self.analysis.trend_threshold_pct
            || self.analysis.highly_significant_threshold_pct
                < self.analysis.significant_threshold_pct
        {
            return Err(ConfigError::ValidationError(
                "Thresholds must satisfy 0 <= trend <= significant <= highly_significant"
                    .to_string(),
            ));
        }
        validate_offset(&self.analysis.default_tz_offset)?;
        Ok(())
    }
}

fn validate_offset(offset: &str) -> Result<()> {
    let rest = offset
        .strip_prefix('+')
        .or_else(|| offset.strip_prefix('-'))
        .unwrap_or(offset);
    let valid = matches!(
        rest.split_once(':'),
        Some((h, m))
            if h.len() == 2
                && m.len() == 2
                && h.parse::<u8>().map(|h| h < 24).unwrap_or(false)
                && m.parse::<u8>().map(|m| m < 60).unwrap_or(false)
    );
    if valid {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "Invalid timezone offset '{offset}' (expected +HH:MM or -HH:MM)"
        )))
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Upper bound of the process-wide connection pool
    pub pool_size: u32,
    /// Connection acquisition timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum rows a single fetch may return
    pub fetch_limit: usize,
    /// Retries for transient acquisition errors
    pub max_retries: u32,
    /// Fixed delay between retries, milliseconds
    pub retry_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            dbname: "kpi".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            pool_size: 10,
            connect_timeout_secs: 30,
            fetch_limit: 1_000_000,
            max_retries: 2,
            retry_delay_ms: 100,
        }
    }
}

/// LLM client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URLs tried in order
    pub endpoints: Vec<String>,
    /// Model identifier passed verbatim
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per endpoint before failing over
    pub max_retries: u32,
    /// Multiplier for exponential backoff, seconds
    pub backoff_base: f64,
    pub rate_limit_per_minute: u32,
    /// Hard cap on prompt length in characters
    pub max_prompt_chars: usize,
    /// Headroom left when a prompt is cut down to the cap
    pub truncate_buffer: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:10000".to_string()],
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: 180,
            max_retries: 3,
            backoff_base: 1.0,
            rate_limit_per_minute: 60,
            max_prompt_chars: 80_000,
            truncate_buffer: 500,
        }
    }
}

/// Prompt template settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// YAML template document; the embedded default is used when unset
    pub template_path: Option<PathBuf>,
    /// Maximum comparison records rendered into the prompt preview
    pub preview_rows: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            template_path: None,
            preview_rows: 200,
        }
    }
}

/// Comparison thresholds and time handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// |change_pct| below this is stable
    pub trend_threshold_pct: f64,
    /// |change_pct| above this is medium significance
    pub significant_threshold_pct: f64,
    /// |change_pct| above this is high significance
    pub highly_significant_threshold_pct: f64,
    /// Offset applied to window strings without an explicit one
    pub default_tz_offset: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            trend_threshold_pct: 5.0,
            significant_threshold_pct: 10.0,
            highly_significant_threshold_pct: 20.0,
            default_tz_offset: "+09:00".to_string(),
        }
    }
}

/// Downstream persistence endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// POST target; payload delivery is skipped when unset
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Emit structured JSON log lines instead of the human format
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
