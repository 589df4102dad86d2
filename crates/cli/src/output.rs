//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use profile_e2e::{CaseStatus, SuiteResult};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

fn print_plain<T: TableDisplay>(item: &T) {
    for (header, value) in T::headers().iter().zip(item.row().iter()) {
        println!("{}: {}", header, value);
    }
}

/// Print a serializable value as JSON or YAML
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Yaml => match serde_yaml::to_string(value) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => print_error(&format!("Cannot encode YAML: {}", e)),
        },
        _ => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => print_error(&format!("Cannot encode JSON: {}", e)),
        },
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() && matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", table(items)),
        OutputFormat::Json | OutputFormat::Yaml => print_structured(items, format),
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                print_plain(item);
            }
        }
    }
}

pub fn status_label(status: CaseStatus) -> String {
    match status {
        CaseStatus::Passed => "✓ passed".green().to_string(),
        CaseStatus::Failed => "✗ failed".red().to_string(),
        CaseStatus::Aborted => "! aborted".yellow().to_string(),
        CaseStatus::Skipped => "○ skipped".dimmed().to_string(),
    }
}

/// Totals line printed under the per-case table
pub fn print_summary(suite: &SuiteResult) {
    let mut parts = vec![
        format!("{} passed", suite.passed).green().to_string(),
        format!("{} failed", suite.failed).red().to_string(),
    ];
    if suite.aborted > 0 {
        parts.push(format!("{} aborted", suite.aborted).yellow().to_string());
    }
    if suite.skipped > 0 {
        parts.push(format!("{} skipped", suite.skipped).dimmed().to_string());
    }
    if suite.not_run > 0 {
        parts.push(format!("{} not run", suite.not_run).yellow().to_string());
    }

    println!();
    println!(
        "{} {} in {:.1}s",
        "Result:".bold(),
        parts.join(", "),
        suite.duration_ms as f64 / 1000.0
    );
    if suite.inconsistencies > 0 {
        print_warning(&format!(
            "{} case(s) saw the UI and the API disagree",
            suite.inconsistencies
        ));
    }
    if suite.cleanup_failures > 0 {
        print_warning(&format!(
            "{} cleanup step(s) failed; run `profile-e2e sweep` to remove leftovers",
            suite.cleanup_failures
        ));
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
