//! PEG sample, aggregate and comparison types

use crate::window::WindowTag;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw sample row fetched from the store
///
/// Identifier fields may be absent on individual rows but are expected to be
/// consistent within a single analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: NaiveDateTime,
    pub peg_name: String,
    pub value: f64,
    pub ne_key: Option<String>,
    pub host_name: Option<String>,
    pub index_name: Option<String>,
}

/// Row restriction applied when fetching samples
///
/// Empty collections mean "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub ne: Option<String>,
    pub cell_ids: Vec<String>,
    pub host: Option<String>,
    pub peg_names: Vec<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.ne.is_none() && self.cell_ids.is_empty() && self.host.is_none() && self.peg_names.is_empty()
    }
}

/// Per-PEG aggregate for one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPeg {
    pub peg_name: String,
    pub window: WindowTag,
    /// Mean of all sample values
    pub avg: f64,
    /// Number of samples behind `avg`
    pub count: u64,
    /// Relative standard deviation in percent; 0 when count < 2 or avg = 0
    pub rsd: f64,
}

impl AggregatedPeg {
    /// The zero aggregate substituted for a window in which a PEG is absent.
    pub fn absent(peg_name: impl Into<String>, window: WindowTag) -> Self {
        Self {
            peg_name: peg_name.into(),
            window,
            avg: 0.0,
            count: 0,
            rsd: 0.0,
        }
    }
}

/// Direction of change between the two windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// How material a change is, judged on |change_pct|
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    High,
    Medium,
    Low,
}

/// Sample-count-based quality grade of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    High,
    Medium,
    Low,
}

/// One PEG compared across the two windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub peg_name: String,
    pub weight: i64,
    pub n1: AggregatedPeg,
    pub n: AggregatedPeg,
    /// `n.avg - n1.avg`
    pub change_abs: f64,
    /// `100 * change_abs / n1.avg`, 0 when `n1.avg` is 0
    pub change_pct: f64,
    pub trend: Trend,
    pub significance: Significance,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    pub data_quality: DataQuality,
    pub derived: bool,
}

/// Summary statistics over all comparison records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total: u64,
    pub improved: u64,
    pub declined: u64,
    pub stable: u64,
    pub weighted_avg_change: f64,
    pub overall_trend: Trend,
}

impl Default for SummaryStats {
    fn default() -> Self {
        Self {
            total: 0,
            improved: 0,
            declined: 0,
            stable: 0,
            weighted_avg_change: 0.0,
            overall_trend: Trend::Stable,
        }
    }
}

/// Identifiers captured from raw rows before the groupwise reduction
///
/// Each field falls back to the sentinel `"unknown"` when no source provides
/// a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisIdentifiers {
    pub ne_id: String,
    pub cell_id: String,
    pub sw_name: String,
}

pub const UNKNOWN_IDENTIFIER: &str = "unknown";

impl Default for AnalysisIdentifiers {
    fn default() -> Self {
        Self {
            ne_id: UNKNOWN_IDENTIFIER.to_string(),
            cell_id: UNKNOWN_IDENTIFIER.to_string(),
            sw_name: UNKNOWN_IDENTIFIER.to_string(),
        }
    }
}

/// Identifiers as captured by the aggregator; fields stay unset when the
/// underlying rows never carried them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialIdentifiers {
    pub ne_id: Option<String>,
    pub cell_id: Option<String>,
    pub sw_name: Option<String>,
}

impl PartialIdentifiers {
    pub fn is_empty(&self) -> bool {
        self.ne_id.is_none() && self.cell_id.is_none() && self.sw_name.is_none()
    }

    /// Field-wise merge preferring `self`, used for the N-1 → N fallback.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            ne_id: self.ne_id.or(fallback.ne_id),
            cell_id: self.cell_id.or(fallback.cell_id),
            sw_name: self.sw_name.or(fallback.sw_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_aggregate_is_zeroed() {
        let agg = AggregatedPeg::absent("A", WindowTag::N);
        assert_eq!(agg.avg, 0.0);
        assert_eq!(agg.count, 0);
        assert_eq!(agg.rsd, 0.0);
    }

    #[test]
    fn test_partial_identifier_merge_prefers_left() {
        let n1 = PartialIdentifiers {
            ne_id: Some("nvgnb#10000".to_string()),
            cell_id: None,
            sw_name: None,
        };
        let n = PartialIdentifiers {
            ne_id: Some("nvgnb#20000".to_string()),
            cell_id: Some("2010".to_string()),
            sw_name: None,
        };
        let merged = n1.or(n);
        assert_eq!(merged.ne_id.as_deref(), Some("nvgnb#10000"));
        assert_eq!(merged.cell_id.as_deref(), Some("2010"));
        assert!(merged.sw_name.is_none());
    }

    #[test]
    fn test_trend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&DataQuality::Low).unwrap(), "\"low\"");
    }
}
