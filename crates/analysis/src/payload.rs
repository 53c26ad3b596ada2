//! Backend payload construction
//!
//! The downstream KPI backend receives one flat document per analysis.
//! Identifier precedence is already resolved in the result; this module
//! only shapes the payload, formats the analysis period, and guarantees
//! `llm_analysis` is never null.

use peg_analyzer_types::peg::ComparisonRecord;
use peg_analyzer_types::request::AnalysisRequest;
use peg_analyzer_types::result::AnalysisResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPeriod {
    pub n_minus_1_start: String,
    pub n_minus_1_end: String,
    pub n_start: String,
    pub n_end: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmAnalysisPayload {
    pub summary: String,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PegComparisonPayload {
    pub peg_name: String,
    pub weight: i64,
    pub n1_avg: f64,
    pub n_avg: f64,
    pub n1_rsd: f64,
    pub n_rsd: f64,
    pub change_absolute: f64,
    pub change_percent: f64,
    pub trend: String,
    pub significance: String,
    pub confidence: f64,
    pub data_quality: String,
    pub derived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
}

/// The document POSTed to the KPI backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendPayload {
    pub ne_id: String,
    pub cell_id: String,
    pub swname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel_ver: Option<String>,
    pub analysis_period: AnalysisPeriod,
    pub analysis_id: String,
    pub llm_analysis: LlmAnalysisPayload,
    pub peg_comparisons: Vec<PegComparisonPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choi_result: Option<serde_json::Value>,
}

fn comparison_payload(record: &ComparisonRecord) -> PegComparisonPayload {
    PegComparisonPayload {
        peg_name: record.peg_name.clone(),
        weight: record.weight,
        n1_avg: record.n1.avg,
        n_avg: record.n.avg,
        n1_rsd: record.n1.rsd,
        n_rsd: record.n.rsd,
        change_absolute: record.change_abs,
        change_percent: record.change_pct,
        trend: record.trend.to_string(),
        significance: format!("{:?}", record.significance).to_lowercase(),
        confidence: record.confidence,
        data_quality: format!("{:?}", record.data_quality).to_lowercase(),
        derived: record.derived,
        cell_id: record.cell_id.clone(),
    }
}

/// Build the backend payload for a finished analysis.
pub fn build_backend_payload(result: &AnalysisResult, request: &AnalysisRequest) -> BackendPayload {
    let (n_minus_1_start, n_minus_1_end) = result.time_windows.n1.format_local();
    let (n_start, n_end) = result.time_windows.n.format_local();

    let llm_analysis = LlmAnalysisPayload {
        summary: result.llm.summary.clone(),
        issues: result.llm.issues.clone(),
        recommendations: result.llm.recommendations.clone(),
        confidence: (result.llm.confidence > 0.0).then_some(result.llm.confidence),
        model_name: (!result.llm.model_label.is_empty()).then(|| result.llm.model_label.clone()),
    };

    BackendPayload {
        ne_id: result.identifiers.ne_id.clone(),
        cell_id: result.identifiers.cell_id.clone(),
        swname: result.identifiers.sw_name.clone(),
        rel_ver: request.rel_ver.clone(),
        analysis_period: AnalysisPeriod {
            n_minus_1_start,
            n_minus_1_end,
            n_start,
            n_end,
        },
        analysis_id: result.analysis_id.clone(),
        llm_analysis,
        peg_comparisons: result.records.iter().map(comparison_payload).collect(),
        choi_result: result.metadata.choi_result.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDateTime, TimeZone};
    use peg_analyzer_types::peg::{
        AggregatedPeg, AnalysisIdentifiers, DataQuality, Significance, SummaryStats, Trend,
    };
    use peg_analyzer_types::result::{AnalysisMetadata, AnalysisStatus, LlmAnalysis};
    use peg_analyzer_types::window::{TimeWindow, WindowPair, WindowTag};

    fn window(day: u32, start_hm: (u32, u32), end_hm: (u32, u32)) -> TimeWindow {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        TimeWindow::new(
            tz.with_ymd_and_hms(2025, 9, day, start_hm.0, start_hm.1, 0).unwrap(),
            tz.with_ymd_and_hms(2025, 9, day, end_hm.0, end_hm.1, 0).unwrap(),
        )
    }

    fn result() -> AnalysisResult {
        let record = ComparisonRecord {
            peg_name: "A".to_string(),
            weight: 1,
            n1: AggregatedPeg {
                peg_name: "A".to_string(),
                window: WindowTag::NMinus1,
                avg: 100.0,
                count: 3,
                rsd: 1.0,
            },
            n: AggregatedPeg {
                peg_name: "A".to_string(),
                window: WindowTag::N,
                avg: 110.0,
                count: 3,
                rsd: 2.0,
            },
            change_abs: 10.0,
            change_pct: 10.0,
            trend: Trend::Up,
            significance: Significance::Medium,
            confidence: 0.85,
            cell_id: Some("2010".to_string()),
            data_quality: DataQuality::High,
            derived: false,
        };

        AnalysisResult {
            status: AnalysisStatus::Success,
            request_id: "req".to_string(),
            analysis_id: "analysis-1".to_string(),
            time_windows: WindowPair {
                n1: window(4, (21, 15), (21, 30)),
                n: window(5, (21, 15), (21, 30)),
            },
            records: vec![record],
            summary: SummaryStats::default(),
            llm: LlmAnalysis {
                summary: "looks fine".to_string(),
                confidence: 0.9,
                model_label: "test-model".to_string(),
                ..LlmAnalysis::default()
            },
            identifiers: AnalysisIdentifiers {
                ne_id: "nvgnb#10000".to_string(),
                cell_id: "2010".to_string(),
                sw_name: "host01".to_string(),
            },
            metadata: AnalysisMetadata::default(),
        }
    }

    fn request() -> AnalysisRequest {
        serde_json::from_value(serde_json::json!({
            "n_minus_1": "2025-09-04_21:15~21:30",
            "n": "2025-09-05_21:15~21:30",
            "rel_ver": "R23B",
            "enable_mock": true
        }))
        .unwrap()
    }

    #[test]
    fn test_identifiers_and_period_format() {
        let payload = build_backend_payload(&result(), &request());
        assert_eq!(payload.ne_id, "nvgnb#10000");
        assert_eq!(payload.cell_id, "2010");
        assert_eq!(payload.swname, "host01");
        assert_eq!(payload.rel_ver.as_deref(), Some("R23B"));
        assert_eq!(payload.analysis_period.n_minus_1_start, "2025-09-04 21:15:00");
        assert_eq!(payload.analysis_period.n_end, "2025-09-05 21:30:00");
    }

    #[test]
    fn test_llm_analysis_never_null() {
        let mut empty = result();
        empty.llm = LlmAnalysis::default();
        let payload = build_backend_payload(&empty, &request());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["llm_analysis"].is_object());
        assert_eq!(json["llm_analysis"]["summary"], "");
        assert_eq!(json["llm_analysis"]["issues"], serde_json::json!([]));
        // empty optional fields are omitted, not null
        assert!(json["llm_analysis"].get("confidence").is_none());
        assert!(json["llm_analysis"].get("model_name").is_none());
    }

    #[test]
    fn test_comparison_rows() {
        let payload = build_backend_payload(&result(), &request());
        assert_eq!(payload.peg_comparisons.len(), 1);
        let row = &payload.peg_comparisons[0];
        assert_eq!(row.peg_name, "A");
        assert_eq!(row.change_absolute, 10.0);
        assert_eq!(row.change_percent, 10.0);
        assert_eq!(row.trend, "up");
        assert_eq!(row.significance, "medium");
        assert_eq!(row.data_quality, "high");
        assert_eq!(row.cell_id.as_deref(), Some("2010"));
    }

    #[test]
    fn test_analysis_period_round_trips_to_second_precision() {
        let source = result();
        let payload = build_backend_payload(&source, &request());
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();

        let parse = |text: &str| {
            tz.from_local_datetime(
                &NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap(),
            )
            .unwrap()
        };
        assert_eq!(parse(&payload.analysis_period.n_minus_1_start), source.time_windows.n1.start);
        assert_eq!(parse(&payload.analysis_period.n_minus_1_end), source.time_windows.n1.end);
        assert_eq!(parse(&payload.analysis_period.n_start), source.time_windows.n.start);
        assert_eq!(parse(&payload.analysis_period.n_end), source.time_windows.n.end);
    }

    #[test]
    fn test_choi_result_passthrough() {
        let mut source = result();
        source.metadata.choi_result = Some(serde_json::json!({"verdict": "ok"}));
        let payload = build_backend_payload(&source, &request());
        assert_eq!(payload.choi_result.unwrap()["verdict"], "ok");
    }
}
