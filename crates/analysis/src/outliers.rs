//! Outlier detection over raw sample values
//!
//! Aggregated averages hide single wild samples, so each PEG group is
//! screened before reduction and suspicious groups are surfaced as
//! warnings on the analysis. Two detectors are provided; IQR is the
//! default because it tolerates the skewed distributions radio counters
//! produce.

use statrs::statistics::Statistics;

/// Tukey fence multiplier
const IQR_MULTIPLIER: f64 = 1.5;
/// Z-score cut-off
const ZSCORE_THRESHOLD: f64 = 3.0;

/// Linear-interpolated percentile of a sorted slice.
fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let fraction = rank - low as f64;
        sorted[low] + fraction * (sorted[high] - sorted[low])
    }
}

/// Indexes of values outside the Tukey fences `[q1 - k*iqr, q3 + k*iqr]`.
///
/// Fewer than four samples cannot support quartiles; such groups return
/// no outliers.
pub fn detect_outliers_iqr(values: &[f64]) -> Vec<usize> {
    if values.len() < 4 {
        return Vec::new();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = percentile_sorted(&sorted, 25.0);
    let q3 = percentile_sorted(&sorted, 75.0);
    let iqr = q3 - q1;
    let lower = q1 - IQR_MULTIPLIER * iqr;
    let upper = q3 + IQR_MULTIPLIER * iqr;

    values
        .iter()
        .enumerate()
        .filter(|(_, &value)| value < lower || value > upper)
        .map(|(index, _)| index)
        .collect()
}

/// Indexes of values more than three sample deviations from the mean.
pub fn detect_outliers_zscore(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }

    let mean = values.mean();
    let std_dev = values.std_dev();
    if std_dev == 0.0 || std_dev.is_nan() {
        return Vec::new();
    }

    values
        .iter()
        .enumerate()
        .filter(|(_, &value)| ((value - mean) / std_dev).abs() > ZSCORE_THRESHOLD)
        .map(|(index, _)| index)
        .collect()
}
