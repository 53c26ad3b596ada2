//! Request validation
//!
//! The inbound request is a JSON map. Recognized fields are enumerated
//! here; unknown keys are ignored with a warning, and the first hard
//! failure wins. The output is a fully typed `AnalysisRequest`.

use peg_analyzer_types::request::{
    AnalysisRequest, AnalysisType, ColumnMap, DbSettings, FilterSpec,
};
use peg_analyzer_types::{AnalyzerError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

const KNOWN_FIELDS: &[&str] = &[
    "n_minus_1",
    "n",
    "analysis_type",
    "enable_mock",
    "table",
    "columns",
    "filters",
    "selected_pegs",
    "peg_definitions",
    "max_prompt_tokens",
    "rel_ver",
    "db",
    "choi_result",
];

/// A validated request plus the warnings raised on the way
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub request: AnalysisRequest,
    pub warnings: Vec<String>,
}

fn invalid(field: &str, reason: impl Into<String>) -> AnalyzerError {
    AnalyzerError::RequestInvalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Coerce a JSON value into a single identifier string.
///
/// Lists contribute their first element, maps their `value` or `name`
/// member; scalars are taken in string form.
pub fn scalar_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => items.first().and_then(scalar_identifier),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("name"))
            .and_then(scalar_identifier),
        _ => None,
    }
}

fn string_list(field: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                _ => Err(invalid(field, "expected a list of strings")),
            })
            .collect(),
        Value::String(text) => Ok(vec![text.clone()]),
        Value::Number(number) => Ok(vec![number.to_string()]),
        _ => Err(invalid(field, "expected a list of strings")),
    }
}

fn required_string(raw: &serde_json::Map<String, Value>, field: &str) -> Result<String> {
    match raw.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(invalid(field, "must not be empty")),
        Some(_) => Err(invalid(field, "must be a string")),
        None => Err(invalid(field, "is required")),
    }
}

fn parse_columns(value: &Value) -> Result<ColumnMap> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("columns", "must be a map of logical to physical names"))?;

    let mut columns = ColumnMap::default();
    for (logical, physical) in map {
        let name = match physical {
            Value::Null => None,
            Value::String(text) => {
                if !is_identifier(text) {
                    return Err(invalid(
                        "columns",
                        format!("'{text}' is not a valid column identifier"),
                    ));
                }
                Some(text.clone())
            }
            _ => return Err(invalid("columns", "column names must be strings")),
        };

        match (logical.as_str(), name) {
            ("time", Some(name)) => columns.time = name,
            ("peg_name", Some(name)) => columns.peg_name = name,
            ("value", Some(name)) => columns.value = name,
            ("time" | "peg_name" | "value", None) => {
                return Err(invalid(
                    "columns",
                    format!("'{logical}' cannot be dropped"),
                ))
            }
            ("ne", name) => columns.ne = name,
            ("cellid", name) => columns.cellid = name,
            ("host", name) => columns.host = name,
            ("index_name", name) => columns.index_name = name,
            (other, _) => {
                return Err(invalid(
                    "columns",
                    format!("unknown logical column '{other}'"),
                ))
            }
        }
    }
    Ok(columns)
}

fn parse_filters(value: &Value) -> Result<FilterSpec> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("filters", "must be a map"))?;

    let mut filters = FilterSpec::default();
    for (key, entry) in map {
        if entry.is_null() {
            continue;
        }
        match key.as_str() {
            "ne" => filters.ne = scalar_identifier(entry),
            "host" => filters.host = scalar_identifier(entry),
            "cellid" => filters.cellid = string_list("filters.cellid", entry)?,
            other => {
                return Err(invalid("filters", format!("unknown filter '{other}'")));
            }
        }
    }
    Ok(filters)
}

fn parse_db(value: &Value) -> Result<DbSettings> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("db", "must be a connection map"))?;

    let field = |name: &str| -> Result<String> {
        match map.get(name) {
            Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
            Some(_) | None => Err(invalid("db", format!("'{name}' is required"))),
        }
    };

    let port = match map.get("port") {
        None => 5432,
        Some(Value::Number(number)) => number
            .as_u64()
            .filter(|&p| p > 0 && p <= u16::MAX as u64)
            .ok_or_else(|| invalid("db", "'port' must be a valid TCP port"))?
            as u16,
        Some(_) => return Err(invalid("db", "'port' must be a number")),
    };

    Ok(DbSettings {
        host: field("host")?,
        port,
        dbname: field("dbname")?,
        user: field("user")?,
        password: field("password")?,
    })
}

/// Validate a raw request map into a typed request.
pub fn validate_request(raw: &Value) -> Result<ValidatedRequest> {
    let map = raw
        .as_object()
        .ok_or_else(|| invalid("request", "request body must be a JSON object"))?;

    let mut warnings = Vec::new();
    for key in map.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            warn!(field = %key, "Ignoring unknown request field");
            warnings.push(format!("ignoring unknown request field '{key}'"));
        }
    }

    let n_minus_1 = required_string(map, "n_minus_1")?;
    let n = required_string(map, "n")?;

    let analysis_type = match map.get("analysis_type") {
        None | Some(Value::Null) => AnalysisType::default(),
        Some(Value::String(text)) => match text.as_str() {
            "overall" => AnalysisType::Overall,
            "enhanced" => AnalysisType::Enhanced,
            "specific" => AnalysisType::Specific,
            other => {
                return Err(invalid(
                    "analysis_type",
                    format!("'{other}' is not one of overall, enhanced, specific"),
                ))
            }
        },
        Some(_) => return Err(invalid("analysis_type", "must be a string")),
    };

    let enable_mock = match map.get("enable_mock") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(invalid("enable_mock", "must be a boolean")),
    };

    let table = match map.get("table") {
        None | Some(Value::Null) => "summary".to_string(),
        Some(Value::String(text)) => {
            if !is_identifier(text) {
                return Err(invalid("table", format!("'{text}' is not a valid table identifier")));
            }
            text.clone()
        }
        Some(_) => return Err(invalid("table", "must be a string")),
    };

    let columns = match map.get("columns") {
        None | Some(Value::Null) => ColumnMap::default(),
        Some(value) => parse_columns(value)?,
    };

    let filters = match map.get("filters") {
        None | Some(Value::Null) => FilterSpec::default(),
        Some(value) => parse_filters(value)?,
    };

    let selected_pegs = match map.get("selected_pegs") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => string_list("selected_pegs", value)?,
    };

    let peg_definitions = match map.get("peg_definitions") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(entries)) => {
            let mut definitions = BTreeMap::new();
            for (name, expression) in entries {
                match expression {
                    Value::String(text) => {
                        definitions.insert(name.clone(), text.clone());
                    }
                    _ => {
                        return Err(invalid(
                            "peg_definitions",
                            format!("expression for '{name}' must be a string"),
                        ))
                    }
                }
            }
            definitions
        }
        Some(_) => {
            return Err(invalid(
                "peg_definitions",
                "must be a map of name to expression",
            ))
        }
    };

    let max_prompt_tokens = match map.get("max_prompt_tokens") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => {
            let tokens = number
                .as_u64()
                .filter(|&t| t >= 1000)
                .ok_or_else(|| invalid("max_prompt_tokens", "must be an integer >= 1000"))?;
            Some(tokens.min(u32::MAX as u64) as u32)
        }
        Some(_) => return Err(invalid("max_prompt_tokens", "must be an integer")),
    };

    let rel_ver = match map.get("rel_ver") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => return Err(invalid("rel_ver", "must be a string")),
    };

    let db = match map.get("db") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_db(value)?),
    };
    if db.is_none() && !enable_mock {
        return Err(invalid("db", "is required unless enable_mock is set"));
    }

    let choi_result = map.get("choi_result").filter(|v| !v.is_null()).cloned();

    Ok(ValidatedRequest {
        request: AnalysisRequest {
            n_minus_1,
            n,
            analysis_type,
            enable_mock,
            table,
            columns,
            filters,
            selected_pegs,
            peg_definitions,
            max_prompt_tokens,
            rel_ver,
            db,
            choi_result,
        },
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "n_minus_1": "2025-09-04_21:15~21:30",
            "n": "2025-09-05_21:15~21:30",
            "enable_mock": true
        })
    }

    #[test]
    fn test_minimal_mock_request() {
        let validated = validate_request(&minimal()).unwrap();
        assert!(validated.request.enable_mock);
        assert!(validated.request.db.is_none());
        assert_eq!(validated.request.analysis_type, AnalysisType::Enhanced);
        assert_eq!(validated.request.table, "summary");
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_missing_window_field() {
        let err = validate_request(&json!({"n": "2025-09-05"})).unwrap_err();
        match err {
            AnalyzerError::RequestInvalid { field, .. } => assert_eq!(field, "n_minus_1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_db_required_without_mock() {
        let mut raw = minimal();
        raw["enable_mock"] = json!(false);
        let err = validate_request(&raw).unwrap_err();
        assert_eq!(err.field(), Some("db"));
    }

    #[test]
    fn test_unknown_fields_warn_but_pass() {
        let mut raw = minimal();
        raw["surprise"] = json!(1);
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.warnings.len(), 1);
        assert!(validated.warnings[0].contains("surprise"));
    }

    #[test]
    fn test_bad_analysis_type() {
        let mut raw = minimal();
        raw["analysis_type"] = json!("wild");
        assert!(validate_request(&raw).is_err());
    }

    #[test]
    fn test_table_whitelisting() {
        let mut raw = minimal();
        raw["table"] = json!("summary; DROP TABLE x");
        let err = validate_request(&raw).unwrap_err();
        assert_eq!(err.field(), Some("table"));
    }

    #[test]
    fn test_column_whitelisting() {
        let mut raw = minimal();
        raw["columns"] = json!({"time": "datetime", "value": "val ue"});
        assert!(validate_request(&raw).is_err());

        raw["columns"] = json!({"time": "ts", "ne": null});
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.request.columns.time, "ts");
        assert!(validated.request.columns.ne.is_none());
    }

    #[test]
    fn test_filters_accept_scalar_or_list_cellid() {
        let mut raw = minimal();
        raw["filters"] = json!({"ne": "nvgnb#10000", "cellid": ["2010", 2011]});
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.request.filters.cellid, vec!["2010", "2011"]);

        raw["filters"] = json!({"cellid": "2010"});
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.request.filters.cellid, vec!["2010"]);
    }

    #[test]
    fn test_max_prompt_tokens_floor() {
        let mut raw = minimal();
        raw["max_prompt_tokens"] = json!(500);
        assert!(validate_request(&raw).is_err());

        raw["max_prompt_tokens"] = json!(24000);
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.request.max_prompt_tokens, Some(24000));
    }

    #[test]
    fn test_db_parsing() {
        let mut raw = minimal();
        raw["enable_mock"] = json!(false);
        raw["db"] = json!({
            "host": "10.0.0.1", "port": 5433, "dbname": "kpi",
            "user": "reader", "password": "secret"
        });
        let validated = validate_request(&raw).unwrap();
        let db = validated.request.db.unwrap();
        assert_eq!(db.port, 5433);
        assert_eq!(db.host, "10.0.0.1");

        raw["db"] = json!({"host": "10.0.0.1"});
        assert!(validate_request(&raw).is_err());
    }

    #[test]
    fn test_scalar_identifier_rules() {
        assert_eq!(scalar_identifier(&json!("x")).as_deref(), Some("x"));
        assert_eq!(scalar_identifier(&json!(["a", "b"])).as_deref(), Some("a"));
        assert_eq!(
            scalar_identifier(&json!({"value": "v", "name": "n"})).as_deref(),
            Some("v")
        );
        assert_eq!(scalar_identifier(&json!({"name": "n"})).as_deref(), Some("n"));
        assert_eq!(scalar_identifier(&json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_identifier(&json!(null)), None);
    }

    #[test]
    fn test_peg_definitions_must_be_strings() {
        let mut raw = minimal();
        raw["peg_definitions"] = json!({"ratio": 5});
        assert!(validate_request(&raw).is_err());

        raw["peg_definitions"] = json!({"ratio": "A/B"});
        let validated = validate_request(&raw).unwrap();
        assert_eq!(validated.request.peg_definitions["ratio"], "A/B");
    }
}
