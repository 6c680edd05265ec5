//! Console summary printed at the end of an import.

use crate::import::{RunMode, StatisticsSnapshot};
use std::fmt::Write;

const BYTES_PER_KILOBYTE: f64 = 1024.0;
const BYTE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
const RULE: &str = "═══════════════════════════════════════════════════════════";

/// `3723.0` becomes `1h 2m 3.00s`; leading zero units are omitted.
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0).floor();
    let minutes = ((seconds % 3600.0) / 60.0).floor();
    let secs = seconds % 60.0;

    if hours > 0.0 {
        format!("{hours:.0}h {minutes:.0}m {secs:.2}s")
    } else if minutes > 0.0 {
        format!("{minutes:.0}m {secs:.2}s")
    } else {
        format!("{secs:.2}s")
    }
}

/// Binary units rounded to two decimals, e.g. `1536` becomes `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= BYTES_PER_KILOBYTE && unit < BYTE_UNITS.len() - 1 {
        value /= BYTES_PER_KILOBYTE;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, BYTE_UNITS[unit])
}

/// Fixed decimals with `,` thousands separators, e.g. `1234.5` with 2 decimals
/// becomes `1,234.50`.
pub fn format_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

/// Metric/value pairs shown in the summary table.
pub fn summary_rows(stats: &StatisticsSnapshot) -> Vec<(&'static str, String)> {
    vec![
        (
            "Total Products Processed",
            format_number(stats.total_processed as f64, 0),
        ),
        (
            "Successful Imports",
            format_number(stats.successful_imports as f64, 0),
        ),
        (
            "Failed Validations",
            format_number(stats.failed_validations as f64, 0),
        ),
        ("Success Rate", format!("{}%", format_number(stats.success_rate, 2))),
        ("Total Duration", format_duration(stats.duration_seconds)),
        ("Memory Used", format_bytes(stats.memory_used)),
        (
            "Average Time per Product",
            format!("{}ms", format_number(stats.average_time_per_item_ms, 2)),
        ),
    ]
}

pub fn render_summary(stats: &StatisticsSnapshot, mode: RunMode) -> String {
    let rows = summary_rows(stats);
    let metric_width = rows
        .iter()
        .map(|(metric, _)| metric.chars().count())
        .max()
        .unwrap_or(0)
        .max("Metric".len());
    let value_width = rows
        .iter()
        .map(|(_, value)| value.chars().count())
        .max()
        .unwrap_or(0)
        .max("Value".len());
    let border = format!(
        "+-{}-+-{}-+",
        "-".repeat(metric_width),
        "-".repeat(value_width)
    );

    let mut out = String::new();
    let _ = writeln!(out, "\n{RULE}");
    let _ = writeln!(out, "{:^59}", "IMPORT SUMMARY");
    let _ = writeln!(out, "{RULE}\n");

    let _ = writeln!(out, "{border}");
    let _ = writeln!(
        out,
        "| {:<metric_width$} | {:<value_width$} |",
        "Metric", "Value"
    );
    let _ = writeln!(out, "{border}");
    for (metric, value) in &rows {
        let _ = writeln!(out, "| {metric:<metric_width$} | {value:<value_width$} |");
    }
    let _ = writeln!(out, "{border}");

    if mode.is_dry_run() {
        let _ = writeln!(out, "\nDRY RUN MODE: No data was saved to the database");
    }

    if stats.failed_validations > 0 {
        let _ = writeln!(
            out,
            "\n{} products failed validation",
            format_number(stats.failed_validations as f64, 0)
        );
        let _ = writeln!(
            out,
            "Check the import_errors log target for details (RUST_LOG=import_errors=error)"
        );
    }

    if stats.successful_imports > 0 {
        let _ = writeln!(out, "\n✓ Import completed successfully");
    }

    let _ = writeln!(out, "\n{RULE}");
    out
}
