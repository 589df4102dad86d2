//! Remove fixtures leaked by interrupted runs

use anyhow::Result;
use clap::Args;
use profile_e2e::config::HarnessConfig;
use profile_e2e::provisioner::{SweepEntry, SweepOutcome};
use profile_e2e::Provisioner;
use profile_e2e_common::FIXTURE_PREFIX;
use serde::Serialize;
use tracing::info;

use super::api_client;
use crate::output::{print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Name prefix of the profiles to delete
    #[arg(long, default_value = FIXTURE_PREFIX)]
    pub prefix: String,

    /// Only show what would be deleted
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
struct SweepDisplay {
    #[serde(flatten)]
    entry: SweepEntry,
}

impl TableDisplay for SweepDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Outcome"]
    }

    fn row(&self) -> Vec<String> {
        let outcome = match &self.entry.outcome {
            SweepOutcome::Deleted => "deleted".to_string(),
            SweepOutcome::WouldDelete => "would delete".to_string(),
            SweepOutcome::Kept(reason) => format!("kept ({})", reason),
            SweepOutcome::Failed(reason) => format!("failed: {}", reason),
        };
        vec![self.entry.id.to_string(), self.entry.name.clone(), outcome]
    }
}

/// Returns false when any deletion failed
pub async fn execute(args: SweepArgs, config: &HarnessConfig, format: OutputFormat) -> Result<bool> {
    if args.prefix.trim().is_empty() {
        anyhow::bail!("refusing to sweep with an empty prefix");
    }

    let provisioner = Provisioner::new(api_client(&config.api)?);
    let entries = provisioner.sweep(&args.prefix, args.dry_run).await?;
    let failed = entries
        .iter()
        .filter(|e| matches!(e.outcome, SweepOutcome::Failed(_)))
        .count();
    let deleted = entries
        .iter()
        .filter(|e| matches!(e.outcome, SweepOutcome::Deleted))
        .count();
    info!(
        "Swept '{}*': {} matched, {} deleted, {} failed",
        args.prefix,
        entries.len(),
        deleted,
        failed
    );

    if entries.is_empty() && format == OutputFormat::Table {
        print_info(&format!("No profiles named '{}*'", args.prefix));
        return Ok(true);
    }

    let displays: Vec<SweepDisplay> = entries.into_iter().map(|entry| SweepDisplay { entry }).collect();
    print_list(&displays, format);

    if format == OutputFormat::Table {
        if failed > 0 {
            print_warning(&format!("{} profile(s) could not be deleted", failed));
        } else if !args.dry_run {
            print_success("Sweep complete");
        }
    }
    Ok(failed == 0)
}
