//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use picanvas_common::{RunReport, TestResult};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

impl TableDisplay for TestResult {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Status", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.passed { "PASS" } else { "FAIL" }.to_string(),
            format!("{} ms", self.duration_ms),
            self.error.as_deref().map(truncate).unwrap_or_default(),
        ]
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 120;
    if s.chars().count() > MAX {
        format!("{}...", s.chars().take(MAX).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Print the pass/fail table and summary for a finished run
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(TestResult::headers());
            for test in &report.tests {
                let row = test.row();
                let color = if test.passed { Color::Green } else { Color::Red };
                table.add_row(vec![
                    Cell::new(&row[0]),
                    Cell::new(&row[1]).fg(color),
                    Cell::new(&row[2]),
                    Cell::new(&row[3]),
                ]);
            }
            println!("{table}");

            for test in report.tests.iter().filter(|t| !t.passed) {
                if let Some(path) = &test.screenshot {
                    println!("  {} screenshot: {}", test.name, path.display());
                }
            }
            if !report.console_errors.is_empty() {
                print_warning(&format!("{} console error(s) captured", report.console_errors.len()));
            }

            let summary = &report.summary;
            let line = format!(
                "{} passed, {} failed, {} total ({:.1}s)",
                summary.passed,
                summary.failed,
                summary.total,
                summary.duration_ms as f64 / 1000.0
            );
            if report.all_passed() {
                println!("{}", line.green().bold());
            } else {
                println!("{}", line.red().bold());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for test in &report.tests {
                let row = test.row();
                println!("{} {} {}", row[1], row[0], row[2]);
                if let Some(error) = &test.error {
                    println!("  {}", error);
                }
            }
            println!(
                "passed={} failed={} total={}",
                report.summary.passed, report.summary.failed, report.summary.total
            );
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
