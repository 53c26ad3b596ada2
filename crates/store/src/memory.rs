//! In-memory sample source for tests and mock mode

use crate::SampleSource;
use async_trait::async_trait;
use peg_analyzer_types::peg::{Filter, RawSample};
use peg_analyzer_types::request::ColumnMap;
use peg_analyzer_types::window::TimeWindow;
use peg_analyzer_types::Result;

/// Serves a fixed set of rows, applying the same window and filter
/// semantics as the real store.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<RawSample>,
}

impl MemorySource {
    pub fn new(rows: Vec<RawSample>) -> Self {
        Self { rows }
    }

    /// A source with no rows at all; mock mode runs against this.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleSource for MemorySource {
    async fn fetch(
        &self,
        window: &TimeWindow,
        filter: &Filter,
        _columns: &ColumnMap,
    ) -> Result<Vec<RawSample>> {
        let start = window.start.naive_local();
        let end = window.end.naive_local();

        let mut rows: Vec<RawSample> = self
            .rows
            .iter()
            .filter(|row| row.timestamp >= start && row.timestamp <= end)
            .filter(|row| {
                filter.peg_names.is_empty() || filter.peg_names.contains(&row.peg_name)
            })
            .filter(|row| match (&filter.ne, &row.ne_key) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|row| match (&filter.host, &row.host_name) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.timestamp);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn sample(ts_minute: u32, peg: &str, value: f64) -> RawSample {
        RawSample {
            timestamp: NaiveDate::from_ymd_opt(2025, 9, 4)
                .unwrap()
                .and_hms_opt(21, ts_minute, 0)
                .unwrap(),
            peg_name: peg.to_string(),
            value,
            ne_key: Some("nvgnb#10000".to_string()),
            host_name: None,
            index_name: None,
        }
    }

    fn window() -> TimeWindow {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        TimeWindow::new(
            tz.with_ymd_and_hms(2025, 9, 4, 21, 15, 0).unwrap(),
            tz.with_ymd_and_hms(2025, 9, 4, 21, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_window_and_peg_filtering() {
        let source = MemorySource::new(vec![
            sample(10, "A", 1.0), // before the window
            sample(20, "A", 2.0),
            sample(25, "B", 3.0),
            sample(45, "A", 4.0), // after the window
        ]);
        let filter = Filter {
            peg_names: vec!["A".to_string()],
            ..Filter::default()
        };
        let rows = source
            .fetch(&window(), &filter, &ColumnMap::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_ne_filter_excludes_rows_without_key() {
        let mut keyless = sample(20, "A", 2.0);
        keyless.ne_key = None;
        let source = MemorySource::new(vec![keyless, sample(25, "A", 3.0)]);
        let filter = Filter {
            ne: Some("nvgnb#10000".to_string()),
            ..Filter::default()
        };
        let rows = source
            .fetch(&window(), &filter, &ColumnMap::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 3.0);
    }

    #[tokio::test]
    async fn test_empty_source_yields_no_rows() {
        let source = MemorySource::empty();
        let rows = source
            .fetch(&window(), &Filter::default(), &ColumnMap::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
