//! Response envelopes and exit codes

use chrono::Utc;
use peg_analyzer_types::result::AnalysisResult;
use peg_analyzer_types::AnalyzerError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Wrap a finished analysis in the success envelope.
pub fn success_envelope(result: &AnalysisResult, execution_time_ms: u128) -> Value {
    serde_json::json!({
        "status": "success",
        "analysis_id": result.analysis_id,
        "timestamp": Utc::now().to_rfc3339(),
        "execution_time_ms": execution_time_ms as u64,
        "result": result,
    })
}

/// Wrap a failure in the error envelope.
pub fn error_envelope(error: &AnalyzerError) -> Value {
    let details = ErrorDetails {
        kind: error.kind().to_string(),
        message: error.to_string(),
        field: error.field().map(str::to_string),
        hint: error.hint(),
    };
    serde_json::json!({
        "status": "error",
        "error_details": details,
    })
}

/// CLI exit code for a failed analysis.
///
/// 2 = request/validation errors, 3 = store errors, 4 = LLM errors,
/// 1 = everything else.
pub fn exit_code(error: &AnalyzerError) -> i32 {
    match error {
        AnalyzerError::RequestInvalid { .. } | AnalyzerError::TimeParse { .. } => 2,
        AnalyzerError::StoreFailure { .. } | AnalyzerError::StoreResultTooLarge { .. } => 3,
        AnalyzerError::LlmUnavailable { .. } | AnalyzerError::LlmBadResponse(_) => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let error = AnalyzerError::RequestInvalid {
            field: "n".to_string(),
            reason: "is required".to_string(),
        };
        let envelope = error_envelope(&error);
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error_details"]["kind"], "request_invalid");
        assert_eq!(envelope["error_details"]["field"], "n");
        assert!(envelope["error_details"].get("hint").is_none());
    }

    #[test]
    fn test_exit_codes() {
        let validation = AnalyzerError::RequestInvalid {
            field: "n".to_string(),
            reason: "missing".to_string(),
        };
        let time = AnalyzerError::TimeParse {
            input: "x".to_string(),
            reason: "bad".to_string(),
            hint: None,
        };
        let store = AnalyzerError::StoreFailure {
            cause: "down".to_string(),
        };
        let too_large = AnalyzerError::StoreResultTooLarge { limit: 10 };
        let llm = AnalyzerError::LlmUnavailable {
            message: "exhausted".to_string(),
            endpoints_attempted: vec![],
        };
        let internal = AnalyzerError::internal("boom");

        assert_eq!(exit_code(&validation), 2);
        assert_eq!(exit_code(&time), 2);
        assert_eq!(exit_code(&store), 3);
        assert_eq!(exit_code(&too_large), 3);
        assert_eq!(exit_code(&llm), 4);
        assert_eq!(exit_code(&internal), 1);
    }
}
