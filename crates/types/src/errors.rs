//! Error types for the analyzer

use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Main error type for the analyzer
///
/// Every boundary operation in the pipeline returns one of these tagged
/// variants. Retries are handled inside the owning component; only
/// `StoreFailure` and `LlmUnavailable` are retried before they surface.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Failed to parse time range '{input}': {reason}")]
    TimeParse {
        input: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Formula syntax error in '{expression}' at position {position}: {reason}")]
    FormulaSyntax {
        expression: String,
        position: usize,
        reason: String,
    },

    #[error("Formula references unknown PEG '{name}'")]
    FormulaUnknownRef { name: String },

    #[error("Failed to load prompt templates: {0}")]
    TemplateLoad(String),

    #[error("Template variable '{name}' was not provided")]
    TemplateVarMissing { name: String },

    #[error("Store operation failed: {cause}")]
    StoreFailure { cause: String },

    #[error("Query returned more than {limit} rows")]
    StoreResultTooLarge { limit: usize },

    #[error("All LLM endpoints exhausted: {message}")]
    LlmUnavailable {
        message: String,
        endpoints_attempted: Vec<String>,
    },

    #[error("LLM returned an unusable response: {0}")]
    LlmBadResponse(String),

    #[error("Invalid request field '{field}': {reason}")]
    RequestInvalid { field: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// Stable machine-readable tag for error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TimeParse { .. } => "time_parse",
            Self::FormulaSyntax { .. } => "formula_syntax",
            Self::FormulaUnknownRef { .. } => "formula_unknown_ref",
            Self::TemplateLoad(_) => "template_load",
            Self::TemplateVarMissing { .. } => "template_var_missing",
            Self::StoreFailure { .. } => "store_failure",
            Self::StoreResultTooLarge { .. } => "store_result_too_large",
            Self::LlmUnavailable { .. } => "llm_unavailable",
            Self::LlmBadResponse(_) => "llm_bad_response",
            Self::RequestInvalid { .. } => "request_invalid",
            Self::Internal(_) => "internal",
        }
    }

    /// The request field an error is attributable to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::RequestInvalid { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Actionable hint surfaced alongside the error message.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::TimeParse { hint, .. } => hint.clone(),
            Self::StoreResultTooLarge { .. } => {
                Some("Tighten the time range or filters to reduce the result size".to_string())
            }
            _ => None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        let err = AnalyzerError::RequestInvalid {
            field: "n_minus_1".to_string(),
            reason: "missing".to_string(),
        };
        assert_eq!(err.kind(), "request_invalid");
        assert_eq!(err.field(), Some("n_minus_1"));
    }

    #[test]
    fn test_too_large_carries_hint() {
        let err = AnalyzerError::StoreResultTooLarge { limit: 100 };
        assert!(err.hint().unwrap().contains("filters"));
    }

    #[test]
    fn test_display_includes_context() {
        let err = AnalyzerError::TimeParse {
            input: "not-a-range".to_string(),
            reason: "missing date".to_string(),
            hint: None,
        };
        let text = err.to_string();
        assert!(text.contains("not-a-range"));
        assert!(text.contains("missing date"));
    }
}
