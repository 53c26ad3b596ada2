//! Analysis result shapes

use crate::peg::{AnalysisIdentifiers, ComparisonRecord, SummaryStats};
use crate::window::WindowPair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal status of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Success,
    Error,
}

/// Qualitative interpretation extracted from the LLM response
///
/// Every field has a default so a missing or unparseable response degrades
/// to an empty analysis rather than a null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub per_peg_notes: BTreeMap<String, String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub model_label: String,
}

/// Side-channel facts accumulated while an analysis runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Non-fatal problems (unknown request keys, omitted derived PEGs, ...)
    #[serde(default)]
    pub warnings: Vec<String>,
    /// True when the LLM answered but no JSON object could be extracted
    #[serde(default)]
    pub llm_parse_failed: bool,
    /// LLM endpoints contacted, in order
    #[serde(default)]
    pub endpoints_attempted: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choi_result: Option<serde_json::Value>,
}

impl AnalysisMetadata {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// The complete outcome of one analysis invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub request_id: String,
    pub analysis_id: String,
    pub time_windows: WindowPair,
    pub records: Vec<ComparisonRecord>,
    pub summary: SummaryStats,
    pub llm: LlmAnalysis,
    pub identifiers: AnalysisIdentifiers,
    pub metadata: AnalysisMetadata,
}
