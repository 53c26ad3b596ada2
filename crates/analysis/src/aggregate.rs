//! Per-window PEG aggregation
//!
//! Grouping rows by PEG name destroys row-level identifier columns, so
//! identifier capture is an explicit first step of aggregation rather than
//! a by-product of the reduction. The captured identifiers travel with the
//! aggregates into the final result.

use crate::outliers;
use peg_analyzer_types::peg::{AggregatedPeg, PartialIdentifiers, RawSample};
use peg_analyzer_types::window::WindowTag;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

/// The aggregates of one window plus the identifiers seen in its rows
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub pegs: Vec<AggregatedPeg>,
    pub identifiers: PartialIdentifiers,
    /// Per-group data oddities worth surfacing (outlier samples)
    pub warnings: Vec<String>,
}

/// Aggregate raw rows into one entry per PEG name.
pub fn aggregate(rows: &[RawSample], tag: WindowTag) -> Aggregation {
    let identifiers = capture_identifiers(rows);

    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.peg_name.as_str()).or_default().push(row.value);
    }

    let mut warnings = Vec::new();
    let pegs = groups
        .into_iter()
        .map(|(peg_name, values)| {
            let count = values.len() as u64;
            let avg = (&values).mean();
            let rsd = if count >= 2 && avg != 0.0 {
                100.0 * (&values).std_dev() / avg
            } else {
                0.0
            };

            let outlier_count = outliers::detect_outliers_iqr(&values).len();
            if outlier_count > 0 {
                warnings.push(format!(
                    "peg {peg_name}: {outlier_count} outlier sample(s) in window {tag}"
                ));
            }

            AggregatedPeg {
                peg_name: peg_name.to_string(),
                window: tag,
                avg,
                count,
                rsd,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        window = %tag,
        rows = rows.len(),
        pegs = pegs.len(),
        "Aggregated window"
    );
    Aggregation {
        pegs,
        identifiers,
        warnings,
    }
}

/// Take each identifier from the first row that carries it.
fn capture_identifiers(rows: &[RawSample]) -> PartialIdentifiers {
    let first_non_empty = |pick: fn(&RawSample) -> Option<&String>| {
        rows.iter()
            .filter_map(pick)
            .find(|value| !value.is_empty())
            .cloned()
    };

    let ne_id = first_non_empty(|row| row.ne_key.as_ref());
    let sw_name = first_non_empty(|row| row.host_name.as_ref());
    let cell_id = first_non_empty(|row| row.index_name.as_ref())
        .and_then(|index_name| derive_cell_id(&index_name));

    PartialIdentifiers {
        ne_id,
        cell_id,
        sw_name,
    }
}

/// Derive a cell id from an index name such as `PEG_420_2010`.
///
/// The trailing all-digit segment wins; when the last segment is not all
/// digits but the one before it is, that one is used instead.
fn derive_cell_id(index_name: &str) -> Option<String> {
    let segments: Vec<&str> = index_name.split('_').collect();
    let all_digits = |s: &&str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    match segments.last() {
        Some(last) if all_digits(last) => Some((*last).to_string()),
        _ => segments
            .len()
            .checked_sub(2)
            .map(|i| segments[i])
            .filter(all_digits)
            .map(str::to_string),
    }
}
