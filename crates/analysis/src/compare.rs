//! Window joining, change classification and summary statistics

use peg_analyzer_config::AnalysisSettings;
use peg_analyzer_types::peg::{
    AggregatedPeg, ComparisonRecord, DataQuality, Significance, SummaryStats, Trend,
};
use peg_analyzer_types::window::WindowTag;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Classify the direction of a change.
pub fn classify_trend(change_pct: f64, settings: &AnalysisSettings) -> Trend {
    if change_pct.abs() < settings.trend_threshold_pct {
        Trend::Stable
    } else if change_pct > 0.0 {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// Classify how material a change is; thresholds are inclusive.
pub fn classify_significance(change_pct: f64, settings: &AnalysisSettings) -> Significance {
    let magnitude = change_pct.abs();
    if magnitude >= settings.highly_significant_threshold_pct {
        Significance::High
    } else if magnitude >= settings.significant_threshold_pct {
        Significance::Medium
    } else {
        Significance::Low
    }
}

fn classify_quality(n1_count: u64, n_count: u64) -> DataQuality {
    if n1_count >= 3 && n_count >= 3 {
        DataQuality::High
    } else if n1_count >= 1 && n_count >= 1 {
        DataQuality::Medium
    } else {
        DataQuality::Low
    }
}

/// Join the two windows' aggregates into ordered comparison records.
///
/// A name present in only one window gets a zeroed aggregate for the other
/// side and low data quality. Records come out sorted by descending weight,
/// then ascending PEG name.
pub fn build_records(
    n1_pegs: Vec<AggregatedPeg>,
    n_pegs: Vec<AggregatedPeg>,
    derived_names: &BTreeSet<String>,
    cell_id: Option<&str>,
    settings: &AnalysisSettings,
) -> Vec<ComparisonRecord> {
    let mut n1_map: BTreeMap<String, AggregatedPeg> = n1_pegs
        .into_iter()
        .map(|peg| (peg.peg_name.clone(), peg))
        .collect();
    let mut n_map: BTreeMap<String, AggregatedPeg> = n_pegs
        .into_iter()
        .map(|peg| (peg.peg_name.clone(), peg))
        .collect();

    let names: BTreeSet<String> = n1_map.keys().chain(n_map.keys()).cloned().collect();

    let mut records: Vec<ComparisonRecord> = names
        .into_iter()
        .map(|name| {
            let n1 = n1_map
                .remove(&name)
                .unwrap_or_else(|| AggregatedPeg::absent(&name, WindowTag::NMinus1));
            let n = n_map
                .remove(&name)
                .unwrap_or_else(|| AggregatedPeg::absent(&name, WindowTag::N));

            let change_abs = n.avg - n1.avg;
            let change_pct = if n1.avg != 0.0 {
                100.0 * change_abs / n1.avg
            } else {
                0.0
            };

            let confidence = if n1.count >= 2 && n.count >= 2 { 0.85 } else { 0.5 };

            ComparisonRecord {
                weight: 1,
                trend: classify_trend(change_pct, settings),
                significance: classify_significance(change_pct, settings),
                data_quality: classify_quality(n1.count, n.count),
                confidence,
                change_abs,
                change_pct,
                cell_id: cell_id.map(str::to_string),
                derived: derived_names.contains(&name),
                peg_name: name,
                n1,
                n,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        (Reverse(a.weight), &a.peg_name).cmp(&(Reverse(b.weight), &b.peg_name))
    });
    records
}

/// Compute the summary over all records.
pub fn summarize(records: &[ComparisonRecord], settings: &AnalysisSettings) -> SummaryStats {
    let mut improved = 0u64;
    let mut declined = 0u64;
    let mut stable = 0u64;
    let mut weighted_change = 0.0;
    let mut total_weight = 0.0;

    for record in records {
        match record.trend {
            Trend::Up => improved += 1,
            Trend::Down => declined += 1,
            Trend::Stable => stable += 1,
        }
        weighted_change += record.weight as f64 * record.change_pct;
        total_weight += record.weight as f64;
    }

    let weighted_avg_change = if total_weight > 0.0 {
        weighted_change / total_weight
    } else {
        0.0
    };

    SummaryStats {
        total: records.len() as u64,
        improved,
        declined,
        stable,
        weighted_avg_change,
        overall_trend: classify_trend(weighted_avg_change, settings),
    }
}
