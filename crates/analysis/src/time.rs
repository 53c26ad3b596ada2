//! Time range parsing
//!
//! Window strings arrive in several spellings: full endpoints
//! (`2025-09-04_21:15~2025-09-05_21:15`), an abbreviated end time that
//! inherits the start date (`2025-09-04_21:15~21:30`), or a bare date that
//! expands to the whole day. `-` may stand in for `_`, seconds are
//! optional, and surrounding whitespace is ignored. A parse never
//! substitutes defaults silently; anything unrecognized is an error with a
//! hint.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use peg_analyzer_types::window::TimeWindow;
use peg_analyzer_types::{AnalyzerError, Result};
use regex::Regex;

/// Parse a `+HH:MM` / `-HH:MM` offset string.
pub fn parse_offset(offset: &str) -> Result<FixedOffset> {
    let err = || AnalyzerError::TimeParse {
        input: offset.to_string(),
        reason: "invalid timezone offset (expected +HH:MM or -HH:MM)".to_string(),
        hint: None,
    };

    let (sign, rest) = match offset.as_bytes().first() {
        Some(b'+') => (1i32, &offset[1..]),
        Some(b'-') => (-1i32, &offset[1..]),
        _ => (1i32, offset),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours >= 24 || minutes >= 60 {
        return Err(err());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}

/// One side of a `~`-separated range
struct Endpoint {
    datetime: NaiveDateTime,
    offset: Option<FixedOffset>,
    /// Whether the input spelled out seconds explicitly
    explicit_seconds: bool,
}

/// Parser for analysis window strings
pub struct TimeRangeParser {
    default_offset: FixedOffset,
    datetime_re: Regex,
    time_only_re: Regex,
    date_only_re: Regex,
    spaced_re: Regex,
    dashed_time_re: Regex,
}

impl TimeRangeParser {
    pub fn new(default_offset: FixedOffset) -> Self {
        Self {
            default_offset,
            datetime_re: Regex::new(
                r"^(\d{4})-(\d{2})-(\d{2})[_-](\d{2}):(\d{2})(?::(\d{2}))?([+-]\d{2}:\d{2})?$",
            )
            .expect("static regex"),
            time_only_re: Regex::new(r"^(\d{2}):(\d{2})(?::(\d{2}))?([+-]\d{2}:\d{2})?$")
                .expect("static regex"),
            date_only_re: Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("static regex"),
            spaced_re: Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}").expect("static regex"),
            dashed_time_re: Regex::new(r"\d{2}-\d{2}:").expect("static regex"),
        }
    }

    pub fn from_offset_str(offset: &str) -> Result<Self> {
        Ok(Self::new(parse_offset(offset)?))
    }

    /// Parse a window string into a pair of tz-aware instants.
    pub fn parse(&self, text: &str) -> Result<TimeWindow> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(self.error(text, "empty time range string"));
        }

        let (start, end) = if let Some((left, right)) = trimmed.split_once('~') {
            self.parse_range(text, left.trim(), right.trim())?
        } else if let Some(captures) = self.date_only_re.captures(trimmed) {
            self.parse_whole_day(text, &captures)?
        } else {
            return Err(self.error(text, "unrecognized time range format"));
        };

        if start > end {
            return Err(AnalyzerError::TimeParse {
                input: text.to_string(),
                reason: "start must not be after end".to_string(),
                hint: None,
            });
        }
        Ok(TimeWindow::new(start, end))
    }

    /// Like [`parse`](Self::parse), but swallows the error.
    pub fn parse_safe(&self, text: &str) -> Option<TimeWindow> {
        match self.parse(text) {
            Ok(window) => Some(window),
            Err(e) => {
                tracing::debug!(error = %e, "parse_safe swallowed a parse failure");
                None
            }
        }
    }

    /// Cheap shape check without building the window.
    pub fn is_valid_format(&self, text: &str) -> bool {
        self.parse(text).is_ok()
    }

    /// Canonical rendering whose re-parse yields the identical window.
    pub fn canonical(window: &TimeWindow) -> String {
        format!(
            "{}~{}",
            window.start.format("%Y-%m-%d_%H:%M:%S"),
            window.end.format("%Y-%m-%d_%H:%M:%S")
        )
    }

    fn parse_range(
        &self,
        original: &str,
        left: &str,
        right: &str,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        if left.is_empty() || right.is_empty() {
            return Err(self.error(original, "both start and end are required"));
        }

        let start = self.parse_endpoint(original, left, None)?;
        let start_date = start.datetime.date();
        let mut end = self.parse_endpoint(original, right, Some(start_date))?;

        // an end of 23:59 without explicit seconds means end-of-minute
        if !end.explicit_seconds
            && end.datetime.time() == NaiveTime::from_hms_opt(23, 59, 0).expect("static time")
        {
            end.datetime = end
                .datetime
                .date()
                .and_hms_opt(23, 59, 59)
                .expect("static time");
        }

        Ok((
            self.attach_offset(original, start.datetime, start.offset)?,
            self.attach_offset(original, end.datetime, end.offset)?,
        ))
    }

    fn parse_whole_day(
        &self,
        original: &str,
        captures: &regex::Captures<'_>,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let date = self.capture_date(original, captures, 1)?;
        let start = date.and_hms_opt(0, 0, 0).expect("static time");
        let end = date.and_hms_opt(23, 59, 59).expect("static time");
        Ok((
            self.attach_offset(original, start, None)?,
            self.attach_offset(original, end, None)?,
        ))
    }

    /// Parse one endpoint. A time-only endpoint is accepted on the right
    /// side of a range, inheriting `inherited_date`.
    fn parse_endpoint(
        &self,
        original: &str,
        text: &str,
        inherited_date: Option<NaiveDate>,
    ) -> Result<Endpoint> {
        if let Some(captures) = self.datetime_re.captures(text) {
            let date = self.capture_date(original, &captures, 1)?;
            return self.capture_time(original, &captures, 4, date);
        }
        if let (Some(date), Some(captures)) = (inherited_date, self.time_only_re.captures(text)) {
            return self.capture_time(original, &captures, 1, date);
        }
        Err(self.error(original, &format!("unrecognized endpoint '{text}'")))
    }

    fn capture_date(
        &self,
        original: &str,
        captures: &regex::Captures<'_>,
        base: usize,
    ) -> Result<NaiveDate> {
        let year: i32 = captures[base].parse().expect("digits");
        let month: u32 = captures[base + 1].parse().expect("digits");
        let day: u32 = captures[base + 2].parse().expect("digits");
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            self.error(original, &format!("invalid date {year:04}-{month:02}-{day:02}"))
        })
    }

    fn capture_time(
        &self,
        original: &str,
        captures: &regex::Captures<'_>,
        base: usize,
        date: NaiveDate,
    ) -> Result<Endpoint> {
        let hour: u32 = captures[base].parse().expect("digits");
        let minute: u32 = captures[base + 1].parse().expect("digits");
        let explicit_seconds = captures.get(base + 2).is_some();
        let second: u32 = captures
            .get(base + 2)
            .map(|m| m.as_str().parse().expect("digits"))
            .unwrap_or(0);

        let datetime = date.and_hms_opt(hour, minute, second).ok_or_else(|| {
            self.error(
                original,
                &format!("invalid time {hour:02}:{minute:02}:{second:02}"),
            )
        })?;
        let offset = captures
            .get(base + 3)
            .map(|m| parse_offset(m.as_str()))
            .transpose()?;

        Ok(Endpoint {
            datetime,
            offset,
            explicit_seconds,
        })
    }

    fn attach_offset(
        &self,
        original: &str,
        datetime: NaiveDateTime,
        explicit: Option<FixedOffset>,
    ) -> Result<DateTime<FixedOffset>> {
        let offset = explicit.unwrap_or(self.default_offset);
        offset
            .from_local_datetime(&datetime)
            .single()
            .ok_or_else(|| self.error(original, "ambiguous local time"))
    }

    fn error(&self, input: &str, reason: &str) -> AnalyzerError {
        AnalyzerError::TimeParse {
            input: input.to_string(),
            reason: reason.to_string(),
            hint: Some(self.format_hint(input)),
        }
    }

    /// Hints for the common typos seen in practice.
    fn format_hint(&self, text: &str) -> String {
        if self.spaced_re.is_match(text) {
            return "separate date and time with '_' or '-', not a space".to_string();
        }
        if self.dashed_time_re.is_match(text) && !self.datetime_re.is_match(text.trim()) {
            return "write times as 15:00, not 15-00".to_string();
        }
        "expected formats: 2025-08-08_15:00~2025-08-08_19:00, 2025-08-08_15:00~19:00 or 2025-08-08"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TimeRangeParser {
        TimeRangeParser::from_offset_str("+09:00").unwrap()
    }

    #[test]
    fn test_full_range() {
        let window = parser()
            .parse("2025-09-04_21:15~2025-09-05_21:30")
            .unwrap();
        let (start, end) = window.format_local();
        assert_eq!(start, "2025-09-04 21:15:00");
        assert_eq!(end, "2025-09-05 21:30:00");
        assert_eq!(window.start.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_abbreviated_end_inherits_date() {
        let window = parser().parse("2025-01-19_00:00~23:59").unwrap();
        let (start, end) = window.format_local();
        assert_eq!(start, "2025-01-19 00:00:00");
        // 23:59 without seconds widens to the end of the minute
        assert_eq!(end, "2025-01-19 23:59:59");
    }

    #[test]
    fn test_explicit_seconds_not_widened() {
        let window = parser().parse("2025-01-19_00:00~23:59:00").unwrap();
        assert_eq!(window.end.format("%H:%M:%S").to_string(), "23:59:00");
    }

    #[test]
    fn test_bare_date_expands_to_whole_day() {
        let window = parser().parse("2025-01-19").unwrap();
        let (start, end) = window.format_local();
        assert_eq!(start, "2025-01-19 00:00:00");
        assert_eq!(end, "2025-01-19 23:59:59");
    }

    #[test]
    fn test_dash_separator_and_whitespace() {
        let window = parser()
            .parse("  2025-09-04-21:15 ~ 2025-09-04-21:30 ")
            .unwrap();
        let (start, end) = window.format_local();
        assert_eq!(start, "2025-09-04 21:15:00");
        assert_eq!(end, "2025-09-04 21:30:00");
    }

    #[test]
    fn test_explicit_offset_is_preserved() {
        let window = parser()
            .parse("2025-09-04_21:15+00:00~2025-09-04_21:30+00:00")
            .unwrap();
        assert_eq!(window.start.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_seconds_component() {
        let window = parser()
            .parse("2025-09-04_21:15:30~2025-09-04_21:30:45")
            .unwrap();
        assert_eq!(window.start.format("%S").to_string(), "30");
        assert_eq!(window.end.format("%S").to_string(), "45");
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = parser().parse("2025-09-04_21:30~21:15").unwrap_err();
        assert_eq!(err.kind(), "time_parse");
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(parser().parse("2025-02-30_10:00~11:00").is_err());
        assert!(parser().parse("2025-13-01").is_err());
    }

    #[test]
    fn test_garbage_rejected_with_hint() {
        let err = parser().parse("2025-09-04 21:15~21:30").unwrap_err();
        match err {
            AnalyzerError::TimeParse { hint, .. } => {
                assert!(hint.unwrap().contains("not a space"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parser().parse("yesterday").unwrap_err();
        assert_eq!(err.kind(), "time_parse");
    }

    #[test]
    fn test_empty_string_rejected() {
        assert!(parser().parse("   ").is_err());
    }

    #[test]
    fn test_parse_safe_and_format_check() {
        let p = parser();
        assert!(p.parse_safe("2025-01-19").is_some());
        assert!(p.parse_safe("not a range").is_none());
        assert!(p.is_valid_format("2025-09-04_21:15~21:30"));
        assert!(!p.is_valid_format("2025-09-04 21:15~21:30"));
    }

    #[test]
    fn test_canonical_round_trip() {
        let p = parser();
        for input in [
            "2025-01-19_00:00~23:59",
            "2025-01-19",
            "2025-09-04_21:15~2025-09-05_21:30",
            "2025-09-04_21:15:30~21:30:45",
        ] {
            let window = p.parse(input).unwrap();
            let reparsed = p.parse(&TimeRangeParser::canonical(&window)).unwrap();
            assert_eq!(window, reparsed, "round trip failed for {input}");
        }
    }
}
