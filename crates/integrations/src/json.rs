//! First-JSON-object extraction from free-form LLM output
//!
//! Models wrap their JSON in prose, markdown fences or trailing chatter.
//! This scanner finds the first balanced top-level object, respecting
//! string literals and escapes, so the caller can hand it to serde.

/// Extract the first balanced `{...}` object from `text`.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        let text = r#"{"summary": "ok"}"#;
        assert_eq!(extract_first_json_object(text), Some(text));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let text = "Here is my analysis:\n```json\n{\"summary\": \"ok\", \"issues\": []}\n```\nHope it helps!";
        assert_eq!(
            extract_first_json_object(text),
            Some("{\"summary\": \"ok\", \"issues\": []}")
        );
    }

    #[test]
    fn test_nested_and_string_braces() {
        let text = r#"noise {"a": {"b": "}"}, "c": "\"{"} trailing"#;
        let object = extract_first_json_object(text).unwrap();
        assert_eq!(object, r#"{"a": {"b": "}"}, "c": "\"{"}"#);
        // and it actually parses
        let value: serde_json::Value = serde_json::from_str(object).unwrap();
        assert_eq!(value["a"]["b"], "}");
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(extract_first_json_object("{\"a\": 1"), None);
        assert_eq!(extract_first_json_object("no json here"), None);
    }
}
