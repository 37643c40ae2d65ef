//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::batch::{BatchFailure, BatchOutcome};
use crate::error::Error;
use crate::io::WrittenFile;
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Binding pairs found in one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingReport {
    /// Source file name.
    pub source_name: String,
    /// Pair ids, aligned with `distances`.
    pub pairs: Vec<String>,
    /// Minimum distances in angstroms.
    pub distances: Vec<f64>,
}

/// Distance map computed for one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactMapReport {
    /// Source file name.
    pub source_name: String,
    /// Residue labels, one per row and column.
    pub axis: Vec<String>,
    /// Row-major distances.
    pub values: Vec<f64>,
}

#[derive(Serialize)]
struct Summary<'a, T: Serialize> {
    processed: usize,
    results: &'a [T],
    failures: &'a [BatchFailure],
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<String>,
}

impl<'a, T: Serialize> Summary<'a, T> {
    fn new(outcome: &'a BatchOutcome, results: &'a [T]) -> Self {
        Self {
            processed: outcome.processed,
            results,
            failures: &outcome.failures,
            aborted: outcome.aborted.as_ref().map(ToString::to_string),
        }
    }
}

/// Formats the files written by a splitting or extraction command.
#[must_use]
pub fn format_written(
    outcome: &BatchOutcome,
    written: &[WrittenFile],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(
                output,
                "Processed {} file(s): {} written, {} failed",
                outcome.processed,
                written.len(),
                outcome.failures.len()
            );
            for file in written {
                let _ = writeln!(
                    output,
                    "  {:<48} {:>10}",
                    file.path.display(),
                    format_size(file.size)
                );
            }
            push_failures_text(&mut output, outcome);
            output
        }
        OutputFormat::Json => format_json(&Summary::new(outcome, written)),
    }
}

/// Formats binding pair reports.
#[must_use]
pub fn format_binding_pairs(
    outcome: &BatchOutcome,
    reports: &[BindingReport],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for report in reports {
                let _ = writeln!(
                    output,
                    "{} ({} pairs)",
                    report.source_name,
                    report.pairs.len()
                );
                for (pair, distance) in report.pairs.iter().zip(&report.distances) {
                    let _ = writeln!(output, "  {pair:<32} {distance:>8.3}");
                }
            }
            push_failures_text(&mut output, outcome);
            output
        }
        OutputFormat::Json => format_json(&Summary::new(outcome, reports)),
    }
}

/// Formats contact map reports.
///
/// Text output prints one row per residue.
#[must_use]
pub fn format_contact_maps(
    outcome: &BatchOutcome,
    reports: &[ContactMapReport],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for report in reports {
                let side = report.axis.len();
                let _ = writeln!(output, "{} ({side}x{side})", report.source_name);
                for (label, row) in report.axis.iter().zip(report.values.chunks(side.max(1))) {
                    let cells: Vec<String> = row.iter().map(|v| format!("{v:.2}")).collect();
                    let _ = writeln!(output, "  {label:<12} {}", cells.join(" "));
                }
            }
            push_failures_text(&mut output, outcome);
            output
        }
        OutputFormat::Json => format_json(&Summary::new(outcome, reports)),
    }
}

/// Formats a fatal error.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => format_json(&serde_json::json!({
            "error": error.to_string(),
            "transport": error.is_transport(),
        })),
    }
}

fn push_failures_text(output: &mut String, outcome: &BatchOutcome) {
    if !outcome.failures.is_empty() {
        output.push_str("Failures:\n");
        for failure in &outcome.failures {
            let _ = writeln!(output, "  {}: {}", failure.source_name, failure.message);
        }
    }
    if let Some(error) = &outcome.aborted {
        let _ = writeln!(output, "Aborted: {error}");
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats a byte size as human-readable.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
