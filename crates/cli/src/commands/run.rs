//! Run scenarios against the app or the in-process stub

use anyhow::Result;
use clap::Args;
use profile_e2e::config::HarnessConfig;
use profile_e2e::stub::{Faults, StubHarness};
use profile_e2e::{CaseFilter, CaseReport, SuiteResult, SuiteRunner};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::output::{print_info, print_list, print_structured, print_summary, status_label, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Only run scenarios carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only run cases whose name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Stop once a case sees the UI and the API disagree
    #[arg(long, env = "PROFILE_E2E_FAIL_FAST")]
    pub fail_fast: bool,

    /// Run against the in-process stub backend instead of the app
    #[arg(long)]
    pub stub: bool,

    /// Scenario directory
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Directory for test-results.json and screenshots
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Do not capture screenshots of failed cases
    #[arg(long)]
    pub no_screenshots: bool,
}

impl RunArgs {
    /// Fold the flags into the loaded configuration
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(dir) = &self.scenarios {
            config.run.scenarios_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.run.output_dir = dir.clone();
        }
        if self.fail_fast {
            config.run.fail_fast = true;
        }
        if self.no_screenshots {
            config.run.screenshot_on_failure = false;
        }
    }

    pub fn filter(&self) -> CaseFilter {
        CaseFilter {
            tag: self.tag.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Serialize)]
struct CaseRow {
    name: String,
    operation: String,
    status: String,
    phase: String,
    duration_ms: u64,
    error: String,
}

impl From<&CaseReport> for CaseRow {
    fn from(report: &CaseReport) -> Self {
        let error = report
            .error
            .clone()
            .or_else(|| report.skip_reason.clone())
            .unwrap_or_default();
        Self {
            name: report.name.clone(),
            operation: report.operation.clone(),
            status: status_label(report.status),
            phase: format!("{:?}", report.phase).to_lowercase(),
            duration_ms: report.duration_ms,
            error: if report.inconsistency {
                format!("[inconsistency] {}", error)
            } else {
                error
            },
        }
    }
}

impl TableDisplay for CaseRow {
    fn headers() -> Vec<&'static str> {
        vec!["Case", "Operation", "Status", "Phase", "Time", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.operation.clone(),
            self.status.clone(),
            self.phase.clone(),
            format!("{}ms", self.duration_ms),
            self.error.chars().take(80).collect(),
        ]
    }
}

/// Run the selected cases; returns whether the suite succeeded
pub async fn execute(args: RunArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<bool> {
    args.apply(&mut config);
    let filter = args.filter();

    let suite = if args.stub {
        let snapshots = config.run.output_dir.join("snapshots");
        let stub = StubHarness::start(Faults::default(), Some(snapshots)).await?;
        if format == OutputFormat::Table {
            print_info(&format!("Stub backend at {}", stub.server.base_url()));
        }
        drive(stub.runner(&config.run), &filter).await?
    } else {
        drive(SuiteRunner::from_config(&config).await?, &filter).await?
    };

    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            let rows: Vec<CaseRow> = suite.results.iter().map(CaseRow::from).collect();
            print_list(&rows, format);
            print_summary(&suite);
        }
        OutputFormat::Json | OutputFormat::Yaml => print_structured(&suite, format),
    }

    Ok(suite.success())
}

/// Run, persist the results and release the runner's resources
async fn drive(runner: SuiteRunner, filter: &CaseFilter) -> Result<SuiteResult> {
    let outcome = runner.run_filtered(filter).await;
    let suite = match outcome {
        Ok(suite) => suite,
        Err(e) => {
            warn!("Suite aborted: {}", e);
            runner.shutdown().await?;
            return Err(e.into());
        }
    };

    info!(
        "Suite finished: {} passed, {} failed, {} aborted, {} skipped",
        suite.passed, suite.failed, suite.aborted, suite.skipped
    );
    let written = runner.write_results(&suite);
    runner.shutdown().await?;
    written?;
    Ok(suite)
}
