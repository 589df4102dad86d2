//! Profile lifecycle against the stub backend
//!
//! Every test serves a fresh in-memory store over real HTTP and drives the
//! simulated UI rendering the same store.

use async_trait::async_trait;
use profile_e2e::cases::{BuiltinCase, CaseKind};
use profile_e2e::config::RunConfig;
use profile_e2e::coordinator::CaseStatus;
use profile_e2e::stub::{Faults, SimulatedUi, StubHarness};
use profile_e2e::ui::{
    row_named, Badge, ProfileRow, RowAction, SelectorView, UiSurface, WizardField, WizardPick,
    WizardView,
};
use profile_e2e::wizard::{GuardError, WizardControl, WizardDraft, WizardStep};
use profile_e2e::{
    E2eError, E2eResult, Expected, HttpProfileApi, ProfileApi, SessionContext, UiDriver,
};
use profile_e2e_common::{conflict_detail, NewProfile, ProfileAttributes, FIXTURE_PREFIX};
use std::sync::Arc;
use test_case::test_case;

fn quick_run() -> RunConfig {
    RunConfig {
        settle_attempts: 1,
        settle_interval_ms: 0,
        screenshot_on_failure: false,
        ..RunConfig::default()
    }
}

async fn harness() -> StubHarness {
    StubHarness::start(Faults::default(), None).await.unwrap()
}

fn request(name: &str, attributes: ProfileAttributes) -> NewProfile {
    NewProfile {
        name: name.to_string(),
        attributes,
    }
}

/// No fixture survives its case
async fn assert_no_fixtures(stub: &StubHarness) {
    let leaked: Vec<String> = stub
        .api
        .list_profiles()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .filter(|n| n.starts_with(FIXTURE_PREFIX))
        .collect();
    assert!(leaked.is_empty(), "leaked fixtures: {:?}", leaked);
}

#[test_case(CaseKind::CreateViaApi { attributes: ProfileAttributes::default().with_description("api") } ; "create via api")]
#[test_case(CaseKind::CreateViaWizard { attributes: ProfileAttributes::default().with_genie_space("space-e2e", "E2E Space") } ; "create via wizard")]
#[test_case(CaseKind::DuplicateNameRejected ; "duplicate name rejected")]
#[test_case(CaseKind::SetDefault ; "set default")]
#[test_case(CaseKind::LastProfileProtection ; "last profile protection")]
#[test_case(CaseKind::Duplicate { attributes: ProfileAttributes::default().with_slide_style(3).with_deck_prompt(4) } ; "duplicate")]
#[test_case(CaseKind::Rename ; "rename")]
#[test_case(CaseKind::LoadVsDefault ; "load vs default")]
#[test_case(CaseKind::WizardGuards ; "wizard guards")]
#[test_case(CaseKind::DeleteViaUi ; "delete via ui")]
#[test_case(CaseKind::SessionRestore ; "session restore")]
#[tokio::test]
async fn builtin_case_passes_and_cleans_up(kind: CaseKind) {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let before = stub.api.list_profiles().await.unwrap();

    let case = BuiltinCase::new(kind.key(), kind);
    let report = coordinator.run_case(&case).await;

    assert_eq!(report.status, CaseStatus::Passed, "{:?}", report.error);
    assert_eq!(report.cleanup_failures(), 0);
    assert_no_fixtures(&stub).await;

    // Default and loaded flags are back where they were
    let after = stub.api.list_profiles().await.unwrap();
    let default_of = |profiles: &[profile_e2e_common::Profile]| {
        profiles.iter().find(|p| p.is_default).map(|p| p.id)
    };
    assert_eq!(default_of(&before), default_of(&after));
    assert_eq!(stub.api.current_profile().await.unwrap().id, before[0].id);
}

#[tokio::test]
async fn get_after_post_returns_submitted_attributes() {
    let stub = harness().await;
    let attributes = ProfileAttributes::default()
        .with_description("Quarterly decks")
        .with_slide_style(2)
        .with_deck_prompt(11)
        .with_genie_space("space-sales", "Sales Space");

    let created = stub
        .api
        .create_profile(&request("E2E Test Create 1706600000000", attributes.clone()))
        .await
        .unwrap();
    let fetched = stub.api.get_profile(created.id).await.unwrap();

    assert_eq!(fetched.name, "E2E Test Create 1706600000000");
    assert_eq!(fetched.attributes(), attributes);
    assert!(fetched.id > 0);
    assert!(!fetched.created_by.is_empty());
    assert!(!fetched.updated_by.is_empty());
    assert!(!fetched.is_default);
}

#[tokio::test]
async fn second_create_with_same_name_conflicts() {
    let stub = harness().await;
    let name = "E2E Test Conflict 1706600000000";
    stub.api
        .create_profile(&request(name, ProfileAttributes::default()))
        .await
        .unwrap();

    let err = stub
        .api
        .create_profile(&request(name, ProfileAttributes::default().with_description("other")))
        .await
        .unwrap_err();
    assert!(matches!(&err, E2eError::Conflict { name: n, .. } if n == name));
    assert_eq!(err.to_string(), format!("Profile with name '{}' already exists", name));

    let same_name = stub
        .api
        .list_profiles()
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.name == name)
        .count();
    assert_eq!(same_name, 1);
}

#[tokio::test]
async fn set_default_leaves_exactly_one_default() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let mut cx = coordinator.context("Default");
    let x = cx.fixture(None).await.unwrap();
    let _other = cx.fixture(None).await.unwrap();

    let mut session = SessionContext::default();
    cx.driver.set_default(&mut session, x.id).await.unwrap();

    let defaults: Vec<_> = stub
        .api
        .list_profiles()
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.is_default)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, x.id);
    cx.verifier.verify_single_default(&x.name).await.unwrap();

    cx.teardown().await;
}

#[tokio::test]
async fn last_profile_cannot_be_deleted_through_either_channel() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let before = stub.api.list_profiles().await.unwrap();
    assert_eq!(before.len(), 1);

    let rows = stub.ui.rows().await.unwrap();
    assert!(!rows[0].offers(profile_e2e::ui::RowAction::Delete));

    let mut session = SessionContext::default();
    let ui_err = coordinator
        .context("Last Profile")
        .driver
        .delete(&mut session, before[0].id)
        .await
        .unwrap_err();
    assert!(matches!(ui_err, E2eError::LastEntity(_)));

    let api_err = stub.api.delete_profile(before[0].id).await.unwrap_err();
    assert_eq!(api_err.to_string(), "Cannot delete the last profile");
    assert_eq!(stub.api.list_profiles().await.unwrap(), before);
}

#[tokio::test]
async fn duplicate_copies_associations_under_new_id() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let mut cx = coordinator.context("Duplicate");
    let source = cx
        .fixture(Some(&ProfileAttributes::default().with_slide_style(2).with_deck_prompt(9)))
        .await
        .unwrap();

    let mut session = SessionContext::default();
    cx.driver
        .duplicate(&mut session, source.id, "E2E Test Copy 1706600000000")
        .await
        .unwrap();
    let copy = cx.adopt("E2E Test Copy 1706600000000").await.unwrap();

    assert_ne!(copy.id, source.id);
    assert_eq!(copy.name, "E2E Test Copy 1706600000000");
    assert_eq!(copy.slide_style_id, Some(2));
    assert_eq!(copy.deck_prompt_id, Some(9));
    assert!(!copy.is_default);

    let records = cx.teardown().await;
    assert!(records.iter().all(|r| r.ok));
    assert_no_fixtures(&stub).await;
}

#[tokio::test]
async fn rename_keeps_id_and_releases_old_name() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let old_name = "E2E Test Rename 1706600000000";
    let new_name = "E2E Test Rename Updated";

    let created = stub
        .api
        .create_profile(&request(old_name, ProfileAttributes::default()))
        .await
        .unwrap();

    let cx = coordinator.context("Rename");
    let draft = WizardDraft {
        name: new_name.to_string(),
        ..WizardDraft::from_profile(&created)
    };
    let saved = cx.driver.edit_via_wizard(&created, &draft).await.unwrap();
    assert_eq!(saved, new_name);

    let renamed = stub.api.find_by_name(new_name).await.unwrap().unwrap();
    assert_eq!(renamed.id, created.id);
    assert_eq!(renamed.name, new_name);
    assert!(stub.api.find_by_name(old_name).await.unwrap().is_none());
    cx.verifier
        .verify(created.id, &Expected::new().name(new_name))
        .await
        .unwrap();

    stub.api.delete_profile(created.id).await.unwrap();
}

#[tokio::test]
async fn skipping_optional_steps_in_edit_clears_stored_associations() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let created = stub
        .api
        .create_profile(&request(
            "E2E Test Unlink 1706600000000",
            ProfileAttributes::default()
                .with_slide_style(2)
                .with_deck_prompt(5)
                .with_genie_space("space-e2e", "E2E Space"),
        ))
        .await
        .unwrap();

    let cx = coordinator.context("Unlink");
    let draft = WizardDraft {
        genie_space: None,
        deck_prompt_id: None,
        ..WizardDraft::from_profile(&created)
    };
    cx.driver.edit_via_wizard(&created, &draft).await.unwrap();

    let stored = stub.api.get_profile(created.id).await.unwrap();
    assert_eq!(stored.genie_space, None);
    assert_eq!(stored.deck_prompt_id, None);
    assert_eq!(stored.slide_style_id, Some(2));
    assert_eq!(stored.name, created.name);

    stub.api.delete_profile(created.id).await.unwrap();
}

/// Simulated UI whose submit loses a race: the same name is created
/// through the API right before Submit is clicked
struct RacedSubmit {
    inner: Arc<SimulatedUi>,
    api: Arc<HttpProfileApi>,
    name: String,
}

#[async_trait]
impl UiSurface for RacedSubmit {
    async fn open_profiles(&self) -> E2eResult<()> {
        self.inner.open_profiles().await
    }

    async fn selector(&self) -> E2eResult<SelectorView> {
        self.inner.selector().await
    }

    async fn choose_in_selector(&self, name: &str) -> E2eResult<()> {
        self.inner.choose_in_selector(name).await
    }

    async fn rows(&self) -> E2eResult<Vec<ProfileRow>> {
        self.inner.rows().await
    }

    async fn row_action(&self, name: &str, action: RowAction) -> E2eResult<()> {
        self.inner.row_action(name, action).await
    }

    async fn submit_duplicate_dialog(&self, new_name: &str) -> E2eResult<()> {
        self.inner.submit_duplicate_dialog(new_name).await
    }

    async fn duplicate_dialog_error(&self) -> E2eResult<Option<String>> {
        self.inner.duplicate_dialog_error().await
    }

    async fn open_wizard(&self) -> E2eResult<()> {
        self.inner.open_wizard().await
    }

    async fn wizard(&self) -> E2eResult<WizardView> {
        self.inner.wizard().await
    }

    async fn fill_wizard(&self, field: WizardField, value: &str) -> E2eResult<()> {
        self.inner.fill_wizard(field, value).await
    }

    async fn pick_in_wizard(&self, pick: &WizardPick) -> E2eResult<()> {
        self.inner.pick_in_wizard(pick).await
    }

    async fn wizard_control_enabled(&self, control: WizardControl) -> E2eResult<bool> {
        self.inner.wizard_control_enabled(control).await
    }

    async fn click_wizard(&self, control: WizardControl) -> E2eResult<()> {
        if control == WizardControl::Submit {
            self.api
                .create_profile(&request(&self.name, ProfileAttributes::default()))
                .await?;
        }
        self.inner.click_wizard(control).await
    }
}

#[tokio::test]
async fn server_conflict_keeps_wizard_on_review_with_server_text() {
    let stub = harness().await;
    let name = "E2E Test Raced 1706600000000".to_string();
    let ui = Arc::new(RacedSubmit {
        inner: stub.ui.clone(),
        api: stub.api.clone(),
        name: name.clone(),
    });
    let driver = UiDriver::new(ui.clone());

    let draft = WizardDraft {
        slide_style_id: Some(1),
        ..WizardDraft::named(name.clone())
    };
    let err = driver.create_via_wizard(&draft).await.unwrap_err();

    match err {
        E2eError::Conflict { detail, .. } => assert_eq!(detail, conflict_detail(&name)),
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(
        ui.wizard().await.unwrap(),
        WizardView {
            step: Some(WizardStep::Review),
            error: Some(conflict_detail(&name)),
        }
    );

    let raced = stub.api.find_by_name(&name).await.unwrap().unwrap();
    stub.api.delete_profile(raced.id).await.unwrap();
    assert_no_fixtures(&stub).await;
}

#[tokio::test]
async fn loaded_and_default_are_independent_badges() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let mut cx = coordinator.context("Load");
    let a = cx.fixture_for("Load A", None).await.unwrap();
    let b = cx.fixture_for("Load B", None).await.unwrap();

    let mut session = SessionContext::default();
    cx.driver.load_profile(&mut session, b.id).await.unwrap();
    assert_eq!(session.current_profile, Some(b.id));
    assert_eq!(stub.api.current_profile().await.unwrap().id, b.id);
    assert_eq!(stub.ui.selector().await.unwrap().current_name().as_deref(), Some(b.name.as_str()));

    cx.driver.set_default(&mut session, a.id).await.unwrap();

    let rows = stub.ui.rows().await.unwrap();
    let row_a = row_named(&rows, &a.name).unwrap();
    let row_b = row_named(&rows, &b.name).unwrap();
    assert!(row_a.has_badge(Badge::Default));
    assert!(!row_a.has_badge(Badge::Loaded));
    assert!(row_b.has_badge(Badge::Loaded));
    assert!(!row_b.has_badge(Badge::Default));
    cx.verifier.verify_loaded(&session, b.id, &b.name).await.unwrap();

    cx.teardown().await;
}

#[tokio::test]
async fn wizard_guards_follow_required_fields() {
    let stub = harness().await;
    let ui = stub.ui.clone();

    ui.open_wizard().await.unwrap();
    assert_eq!(ui.wizard().await.unwrap().step, Some(WizardStep::Name));
    assert!(!ui.wizard_control_enabled(WizardControl::Next).await.unwrap());

    ui.fill_wizard(WizardField::Name, "E2E Test Guards 1706600000000").await.unwrap();
    assert!(ui.wizard_control_enabled(WizardControl::Next).await.unwrap());
    ui.click_wizard(WizardControl::Next).await.unwrap();
    ui.click_wizard(WizardControl::Skip).await.unwrap();

    assert_eq!(ui.wizard().await.unwrap().step, Some(WizardStep::SlideStyle));
    assert!(!ui.wizard_control_enabled(WizardControl::Next).await.unwrap());
    assert!(!ui.wizard_control_enabled(WizardControl::Skip).await.unwrap());

    ui.pick_in_wizard(&WizardPick::SlideStyle(1)).await.unwrap();
    assert!(ui.wizard_control_enabled(WizardControl::Next).await.unwrap());
}

#[tokio::test]
async fn wizard_without_style_reports_validation() {
    let stub = harness().await;
    let coordinator = stub.coordinator(&quick_run());
    let cx = coordinator.context("Wizard");

    let draft = WizardDraft::named("E2E Test Wizard 1706600000000");
    let err = cx.driver.create_via_wizard(&draft).await.unwrap_err();
    assert!(matches!(err, E2eError::Validation(GuardError::StyleRequired)));
    assert!(stub.api.find_by_name(&draft.name).await.unwrap().is_none());
}

#[tokio::test]
async fn full_builtin_suite_passes_on_fresh_backend() {
    let stub = harness().await;
    let output = tempfile::tempdir().unwrap();
    let run = RunConfig {
        output_dir: output.path().to_path_buf(),
        scenarios_dir: output.path().join("absent"),
        ..quick_run()
    };
    let runner = stub.runner(&run);

    let suite = runner
        .run_filtered(&profile_e2e::CaseFilter::default())
        .await
        .unwrap();
    assert_eq!(suite.total, CaseKind::all().len());
    assert!(suite.success(), "{:#?}", suite.results);
    assert_eq!(suite.skipped, 0);

    let path = runner.write_results(&suite).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["passed"], CaseKind::all().len());
    assert_no_fixtures(&stub).await;
}
