//! Fixed-width data preview embedded in LLM prompts

use peg_analyzer_types::peg::ComparisonRecord;
use std::fmt::Write;

const NAME_WIDTH: usize = 32;

/// Render up to `max_rows` records as an aligned text table.
pub fn render_preview(records: &[ComparisonRecord], max_rows: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<NAME_WIDTH$} {:>14} {:>14} {:>10} {:>8} {:>8} {:>8}",
        "peg_name", "n1_avg", "n_avg", "change_%", "n1_rsd", "n_rsd", "trend"
    );
    let _ = writeln!(out, "{}", "-".repeat(NAME_WIDTH + 14 + 14 + 10 + 8 + 8 + 8 + 6));

    for record in records.iter().take(max_rows) {
        let mut name = record.peg_name.clone();
        if name.len() > NAME_WIDTH {
            name.truncate(NAME_WIDTH - 3);
            name.push_str("...");
        }
        let _ = writeln!(
            out,
            "{:<NAME_WIDTH$} {:>14.4} {:>14.4} {:>9.2}% {:>7.1}% {:>7.1}% {:>8}",
            name,
            record.n1.avg,
            record.n.avg,
            record.change_pct,
            record.n1.rsd,
            record.n.rsd,
            record.trend.to_string(),
        );
    }

    if records.len() > max_rows {
        let _ = writeln!(out, "... and {} more rows", records.len() - max_rows);
    }
    out
}
