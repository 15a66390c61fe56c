//! Run summary output
//!
//! Printed to stderr: stdout carries the page's own console output.

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mocharun_browser::RunSummary;
use serde::Serialize;
use serde_json::Value;

/// Summary format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum SummaryFormat {
    /// Counts line plus a table of failing tests
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Nothing beyond the log line
    Quiet,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    tests: usize,
    passes: usize,
    failures: usize,
    pending: usize,
    duration: u64,
    result_path: String,
    coverage_percent: Option<f64>,
    failed: Vec<&'a str>,
}

/// Render a summary; `None` when nothing should be printed
pub fn render_summary(summary: &RunSummary, format: SummaryFormat) -> Option<String> {
    match format {
        SummaryFormat::Quiet => None,
        SummaryFormat::Json => {
            let json = JsonSummary {
                tests: summary.stats.tests,
                passes: summary.stats.passes,
                failures: summary.stats.failures,
                pending: summary.stats.pending,
                duration: summary.stats.duration,
                result_path: summary.result_path.display().to_string(),
                coverage_percent: summary.coverage.as_ref().and_then(|c| c.percent),
                failed: summary.failures.iter().map(|t| t.full_title.as_str()).collect(),
            };
            serde_json::to_string_pretty(&json).ok()
        }
        SummaryFormat::Table => {
            let mut out = String::new();
            if !summary.failures.is_empty() {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic);
                table.set_header(vec!["Test", "Error", "Code"]);
                for test in &summary.failures {
                    let code = match test.err.get("code") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    table.add_row(vec![
                        test.full_title.clone(),
                        test.error_message().unwrap_or_default().to_string(),
                        code,
                    ]);
                }
                out.push_str(&table.to_string());
                out.push('\n');
            }

            let line = summary.stats.summary();
            if summary.outcome.passed() {
                out.push_str(&format!("✅ {}", line.green()));
            } else {
                out.push_str(&format!("❌ {}", line.red()));
            }
            if let Some(coverage) = &summary.coverage {
                out.push('\n');
                out.push_str(&coverage.describe());
            }
            Some(out)
        }
    }
}

pub fn print_summary(summary: &RunSummary, format: SummaryFormat) {
    if let Some(text) = render_summary(summary, format) {
        eprintln!("{text}");
    }
}
