//! Shipped scenario files run end to end against the stub backend

use profile_e2e::config::RunConfig;
use profile_e2e::coordinator::CaseStatus;
use profile_e2e::stub::{Faults, StubHarness};
use profile_e2e::{CaseFilter, Scenario, SuiteResult};
use std::path::PathBuf;

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/scenarios")
}

fn run_config(output: &std::path::Path) -> RunConfig {
    RunConfig {
        scenarios_dir: scenarios_dir(),
        output_dir: output.to_path_buf(),
        settle_attempts: 1,
        settle_interval_ms: 0,
        screenshot_on_failure: false,
        ..RunConfig::default()
    }
}

#[test]
fn shipped_scenarios_parse() {
    let scenarios = Scenario::load_all(&scenarios_dir()).unwrap();
    let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["crud", "smoke", "state"]);

    let cases: usize = scenarios.iter().map(|s| s.instantiate().len()).sum();
    assert_eq!(cases, 11);
}

#[tokio::test]
async fn smoke_tag_runs_only_smoke_cases() {
    let output = tempfile::tempdir().unwrap();
    let stub = StubHarness::start(Faults::default(), None).await.unwrap();
    let runner = stub.runner(&run_config(output.path()));

    let filter = CaseFilter {
        tag: Some("smoke".to_string()),
        name: None,
    };
    let suite = runner.run_filtered(&filter).await.unwrap();

    assert_eq!(suite.total, 4);
    assert!(suite.results.iter().all(|r| r.name.starts_with("smoke/")));
    assert!(suite.success(), "{:#?}", suite.results);
}

#[tokio::test]
async fn every_shipped_scenario_passes_and_results_are_written() {
    let output = tempfile::tempdir().unwrap();
    let stub = StubHarness::start(Faults::default(), None).await.unwrap();
    let runner = stub.runner(&run_config(output.path()));

    let suite = runner.run_filtered(&CaseFilter::default()).await.unwrap();
    assert!(suite.success(), "{:#?}", suite.results);
    assert!(suite
        .results
        .iter()
        .any(|r| r.name == "crud/duplicate-with-associations" && r.status == CaseStatus::Passed));

    let path = runner.write_results(&suite).unwrap();
    assert_eq!(path, output.path().join("test-results.json"));
    let parsed: SuiteResult =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed.total, suite.total);
    assert_eq!(parsed.results.len(), suite.results.len());
}

#[tokio::test]
async fn unmatched_filter_is_an_error() {
    let output = tempfile::tempdir().unwrap();
    let stub = StubHarness::start(Faults::default(), None).await.unwrap();
    let runner = stub.runner(&run_config(output.path()));

    let filter = CaseFilter {
        tag: Some("nonexistent".to_string()),
        name: None,
    };
    assert!(runner.run_filtered(&filter).await.is_err());
}
