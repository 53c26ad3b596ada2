//! Deterministic canned completion for mock mode

use super::types::Completion;

const MOCK_RESPONSE: &str = r#"{
  "summary": "Mock analysis: no material KPI movement detected between the two periods.",
  "issues": [],
  "recommendations": ["Disable mock mode to run a real analysis"],
  "per_peg_notes": {},
  "confidence": 1.0,
  "model_label": "mock"
}"#;

/// The canned completion returned when mock mode is on.
///
/// Always identical, never touches the network, and the caller must not log
/// request bodies on this path.
pub fn mock_completion() -> Completion {
    Completion {
        text: MOCK_RESPONSE.to_string(),
        endpoint: "mock".to_string(),
        endpoints_attempted: Vec::new(),
        model: Some("mock".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(MOCK_RESPONSE).unwrap();
        assert!(value.get("summary").is_some());
        assert_eq!(value["model_label"], "mock");
    }

    #[test]
    fn test_mock_is_deterministic() {
        assert_eq!(mock_completion().text, mock_completion().text);
    }
}
