//! Suite runner: wires the harness from configuration and runs scenarios

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::api::{HttpProfileApi, ProfileApi};
use crate::browser_ui::PlaywrightSurface;
use crate::cases::BuiltinCase;
use crate::config::{HarnessConfig, RunConfig};
use crate::coordinator::{CaseReport, CaseStatus, Coordinator, ProfileCase};
use crate::driver::UiDriver;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightConfig, PlaywrightSession};
use crate::provisioner::Provisioner;
use crate::scenario::Scenario;
use crate::server::ServerHandle;
use crate::ui::UiSurface;
use crate::verifier::{SettlePolicy, StateVerifier};

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub skipped: usize,
    /// Failed cases whose cause was a UI/API divergence
    pub inconsistencies: usize,
    pub cleanup_failures: usize,
    /// Cases never started because fail-fast stopped the suite
    pub not_run: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseReport>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted == 0 && self.not_run == 0
    }

    fn tally(results: Vec<CaseReport>, not_run: usize, duration: Duration) -> Self {
        let count = |status: CaseStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len() + not_run,
            passed: count(CaseStatus::Passed),
            failed: count(CaseStatus::Failed),
            aborted: count(CaseStatus::Aborted),
            skipped: count(CaseStatus::Skipped),
            inconsistencies: results.iter().filter(|r| r.inconsistency).count(),
            cleanup_failures: results.iter().map(CaseReport::cleanup_failures).sum(),
            not_run,
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }
}

/// Which cases of the loaded scenarios to run
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    /// Only scenarios carrying this tag
    pub tag: Option<String>,
    /// Only cases whose name contains this text
    pub name: Option<String>,
}

impl CaseFilter {
    pub fn select(&self, scenarios: &[Scenario]) -> Vec<BuiltinCase> {
        scenarios
            .iter()
            .filter(|s| self.tag.as_deref().map(|t| s.has_tag(t)).unwrap_or(true))
            .flat_map(Scenario::instantiate)
            .filter(|c| {
                self.name
                    .as_deref()
                    .map(|n| c.name().contains(n))
                    .unwrap_or(true)
            })
            .collect()
    }
}

/// Runs cases one after another through a coordinator
pub struct SuiteRunner {
    coordinator: Coordinator,

    /// Scenario YAML directory
    scenarios_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,

    fail_fast: bool,

    /// Browser surface, closed on shutdown
    browser: Option<Arc<PlaywrightSurface>>,

    /// Spawned application server (if any)
    server: Option<ServerHandle>,
}

impl SuiteRunner {
    /// Runner over an already assembled coordinator
    pub fn new(coordinator: Coordinator, run: &RunConfig) -> Self {
        Self {
            coordinator: coordinator.screenshot_on_failure(run.screenshot_on_failure),
            scenarios_dir: run.scenarios_dir.clone(),
            output_dir: run.output_dir.clone(),
            fail_fast: run.fail_fast,
            browser: None,
            server: None,
        }
    }

    /// Spawn the server if configured, connect to the API and launch the browser
    pub async fn from_config(config: &HarnessConfig) -> E2eResult<Self> {
        let mut config = config.clone();

        let server = match config.server.clone() {
            Some(server_config) => {
                let server = ServerHandle::spawn(server_config).await?;
                // The spawned app serves both the API and the pages
                config.api.base_url = server.base_url().to_string();
                config.ui.base_url = server.base_url().to_string();
                Some(server)
            }
            None => None,
        };

        let api: Arc<dyn ProfileApi> = Arc::new(HttpProfileApi::new(&config.api)?);
        api.health().await.map_err(|e| {
            E2eError::Config(format!("control API at {} is not healthy: {}", config.api.base_url, e))
        })?;

        let page = PlaywrightSession::launch(PlaywrightConfig::from_ui(&config.ui)).await?;
        let surface = Arc::new(PlaywrightSurface::new(
            page,
            config.ui.selectors.clone(),
            config.ui.profiles_path.clone(),
        ));
        let ui: Arc<dyn UiSurface> = surface.clone();

        let coordinator = assemble(api, ui, &config.run);
        let mut runner = Self::new(coordinator, &config.run);
        runner.browser = Some(surface);
        runner.server = server;
        Ok(runner)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn load_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        load_scenarios(&self.scenarios_dir)
    }

    /// Load scenarios, select cases and run them
    pub async fn run_filtered(&self, filter: &CaseFilter) -> E2eResult<SuiteResult> {
        let scenarios = self.load_scenarios()?;
        let cases = filter.select(&scenarios);
        if cases.is_empty() {
            return Err(E2eError::ScenarioParse("no cases match the filter".to_string()));
        }
        Ok(self.run_cases(&cases).await)
    }

    /// Run cases in order; a failing case never stops the suite unless
    /// fail-fast is on and the failure was an inconsistency
    pub async fn run_cases(&self, cases: &[BuiltinCase]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(cases.len());

        info!("Running {} case(s)...", cases.len());

        for (index, case) in cases.iter().enumerate() {
            let report = self.coordinator.run_case(case).await;
            let stop = self.fail_fast && report.inconsistency;
            results.push(report);

            if stop {
                let not_run = cases.len() - index - 1;
                error!("Inconsistency detected, stopping with {} case(s) not run", not_run);
                return self.summarize(results, not_run, start.elapsed());
            }
        }

        self.summarize(results, 0, start.elapsed())
    }

    fn summarize(&self, results: Vec<CaseReport>, not_run: usize, elapsed: Duration) -> SuiteResult {
        let suite = SuiteResult::tally(results, not_run, elapsed);
        info!("");
        info!(
            "Suite results: {} passed, {} failed, {} aborted, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.aborted, suite.skipped, suite.duration_ms
        );
        if suite.cleanup_failures > 0 {
            warn!("{} cleanup step(s) did not complete", suite.cleanup_failures);
        }
        suite
    }

    /// Write suite results to `test-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    /// Close the browser and stop the server
    pub async fn shutdown(mut self) -> E2eResult<()> {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.page().close().await {
                warn!("Failed to close browser: {}", e);
            }
        }
        if let Some(mut server) = self.server.take() {
            server.stop().await?;
        }
        Ok(())
    }
}

/// Scenarios under `dir`; the built-in scenario when the directory is
/// missing or holds none
pub fn load_scenarios(dir: &Path) -> E2eResult<Vec<Scenario>> {
    if !dir.is_dir() {
        info!("No scenario directory at {}, using built-in cases", dir.display());
        return Ok(vec![Scenario::builtin()]);
    }

    let scenarios = Scenario::load_all(dir)?;
    if scenarios.is_empty() {
        warn!("{} holds no scenarios, using built-in cases", dir.display());
        return Ok(vec![Scenario::builtin()]);
    }
    Ok(scenarios)
}

/// Coordinator over an API client and a UI surface
pub fn assemble(api: Arc<dyn ProfileApi>, ui: Arc<dyn UiSurface>, run: &RunConfig) -> Coordinator {
    let settle = SettlePolicy {
        attempts: run.settle_attempts.max(1),
        interval: Duration::from_millis(run.settle_interval_ms),
    };
    Coordinator::new(
        Provisioner::new(api.clone()),
        UiDriver::new(ui.clone()),
        StateVerifier::from_ports(api, ui).with_settle(settle),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Phase;

    fn report(name: &str, status: CaseStatus, inconsistency: bool) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            operation: "Create".to_string(),
            status,
            phase: Phase::Verify,
            error: None,
            inconsistency,
            skip_reason: None,
            duration_ms: 1,
            fixtures: vec![],
            cleanup: vec![],
            screenshot: None,
        }
    }

    #[test]
    fn test_tally_counts_each_status() {
        let suite = SuiteResult::tally(
            vec![
                report("a", CaseStatus::Passed, false),
                report("b", CaseStatus::Failed, true),
                report("c", CaseStatus::Aborted, false),
                report("d", CaseStatus::Skipped, false),
            ],
            2,
            Duration::from_millis(5),
        );
        assert_eq!(suite.total, 6);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.aborted, 1);
        assert_eq!(suite.skipped, 1);
        assert_eq!(suite.inconsistencies, 1);
        assert!(!suite.success());
    }

    #[test]
    fn test_skipped_cases_do_not_fail_the_suite() {
        let suite = SuiteResult::tally(
            vec![
                report("a", CaseStatus::Passed, false),
                report("b", CaseStatus::Skipped, false),
            ],
            0,
            Duration::ZERO,
        );
        assert!(suite.success());
    }

    #[test]
    fn test_filter_by_tag_and_name() {
        let crud = Scenario::from_yaml(
            "name: crud\ntags: [smoke]\ncases:\n  - case: rename\n  - case: delete_via_ui\n",
        )
        .unwrap();
        let builtin = Scenario::builtin();
        let scenarios = vec![crud, builtin];

        let filter = CaseFilter { tag: Some("smoke".to_string()), name: None };
        assert_eq!(filter.select(&scenarios).len(), 2);

        let filter = CaseFilter { tag: None, name: Some("rename".to_string()) };
        let names: Vec<_> = filter
            .select(&scenarios)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["crud/rename", "builtin/rename"]);
    }

    #[test]
    fn test_missing_scenario_dir_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = load_scenarios(&dir.path().join("absent")).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].instantiate().len(), crate::cases::CaseKind::all().len());

        let empty = load_scenarios(dir.path()).unwrap();
        assert_eq!(empty[0].name, Scenario::builtin().name);
    }
}
