//! Analysis time windows
//!
//! A window is a closed, timezone-aware interval. Two of them (the "N-1"
//! baseline and the "N" comparison period) drive every analysis.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two analysis periods an aggregate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowTag {
    #[serde(rename = "N-1")]
    NMinus1,
    #[serde(rename = "N")]
    N,
}

impl WindowTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NMinus1 => "N-1",
            Self::N => "N",
        }
    }
}

impl fmt::Display for WindowTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timezone-aware time range, inclusive on both ends
///
/// Invariant: `start <= end` and both instants carry the same UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        debug_assert!(start <= end, "window start must not be after end");
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Local-time rendering used in backend payloads and prompts.
    pub fn format_local(&self) -> (String, String) {
        (
            self.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.end.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.format_local();
        write!(f, "[{} ~ {}]", start, end)
    }
}

/// The pair of windows an analysis compares
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowPair {
    pub n1: TimeWindow,
    pub n: TimeWindow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        TimeWindow::new(
            tz.with_ymd_and_hms(2025, 9, 4, 21, 15, 0).unwrap(),
            tz.with_ymd_and_hms(2025, 9, 4, 21, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_contains_is_inclusive() {
        let w = window();
        assert!(w.contains(w.start));
        assert!(w.contains(w.end));
        assert!(!w.contains(w.end + Duration::seconds(1)));
    }

    #[test]
    fn test_format_local() {
        let (start, end) = window().format_local();
        assert_eq!(start, "2025-09-04 21:15:00");
        assert_eq!(end, "2025-09-04 21:30:00");
    }

    #[test]
    fn test_tag_round_trip() {
        let json = serde_json::to_string(&WindowTag::NMinus1).unwrap();
        assert_eq!(json, "\"N-1\"");
        let tag: WindowTag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag, WindowTag::NMinus1);
    }
}
