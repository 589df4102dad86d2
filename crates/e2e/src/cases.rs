//! Built-in profile cases
//!
//! Each case provisions its own fixtures, performs one logical UI operation
//! and confirms the outcome through both channels. Scenario files refer to
//! them by their `case` tag.

use async_trait::async_trait;
use profile_e2e_common::{conflict_detail, Profile, ProfileAttributes};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::{CaseContext, CleanupAction, Phase, ProfileCase};
use crate::error::{E2eError, E2eResult};
use crate::fixture::fixture_name;
use crate::ui::{row_named, Badge, WizardField, WizardPick};
use crate::verifier::Expected;
use crate::wizard::{GuardError, ProfileWizard, WizardControl, WizardDraft, WizardStep};

/// Case selector as written in scenario files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "case", rename_all = "snake_case")]
pub enum CaseKind {
    /// Create through the API and read it back
    CreateViaApi {
        #[serde(default)]
        attributes: ProfileAttributes,
    },
    /// Create through the five-step wizard
    CreateViaWizard {
        #[serde(default)]
        attributes: ProfileAttributes,
    },
    /// A second profile with a taken name is refused
    DuplicateNameRejected,
    SetDefault,
    /// Only meaningful against a backend holding a single profile
    LastProfileProtection,
    Duplicate {
        #[serde(default)]
        attributes: ProfileAttributes,
    },
    Rename,
    /// Loaded and default are independent flags
    LoadVsDefault,
    WizardGuards,
    DeleteViaUi,
    /// Restoring a session switches back to its profile
    SessionRestore,
}

impl CaseKind {
    /// Label fixture names are derived from
    pub fn operation(&self) -> &'static str {
        match self {
            CaseKind::CreateViaApi { .. } => "Create",
            CaseKind::CreateViaWizard { .. } => "Wizard",
            CaseKind::DuplicateNameRejected => "Conflict",
            CaseKind::SetDefault => "Default",
            CaseKind::LastProfileProtection => "Last Profile",
            CaseKind::Duplicate { .. } => "Duplicate",
            CaseKind::Rename => "Rename",
            CaseKind::LoadVsDefault => "Load",
            CaseKind::WizardGuards => "Guards",
            CaseKind::DeleteViaUi => "Delete",
            CaseKind::SessionRestore => "Session",
        }
    }

    /// Tag value as used in scenario files
    pub fn key(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("case").and_then(|c| c.as_str()).map(str::to_string))
            .unwrap_or_default()
    }

    /// Every built-in case with default parameters
    pub fn all() -> Vec<CaseKind> {
        vec![
            CaseKind::CreateViaApi {
                attributes: ProfileAttributes::default().with_description("Created by the provisioner"),
            },
            CaseKind::CreateViaWizard {
                attributes: ProfileAttributes::default().with_description("Created through the wizard"),
            },
            CaseKind::DuplicateNameRejected,
            CaseKind::SetDefault,
            CaseKind::LastProfileProtection,
            CaseKind::Duplicate {
                attributes: ProfileAttributes::default()
                    .with_slide_style(2)
                    .with_deck_prompt(7)
                    .with_genie_space("space-e2e", "E2E Space"),
            },
            CaseKind::Rename,
            CaseKind::LoadVsDefault,
            CaseKind::WizardGuards,
            CaseKind::DeleteViaUi,
            CaseKind::SessionRestore,
        ]
    }
}

/// A named instance of a built-in case
#[derive(Debug, Clone)]
pub struct BuiltinCase {
    pub name: String,
    pub kind: CaseKind,
}

impl BuiltinCase {
    pub fn new(name: impl Into<String>, kind: CaseKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Every built-in case, named after its key
    pub fn defaults() -> Vec<BuiltinCase> {
        CaseKind::all()
            .into_iter()
            .map(|kind| BuiltinCase::new(kind.key(), kind))
            .collect()
    }
}

#[async_trait]
impl ProfileCase for BuiltinCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn operation(&self) -> &str {
        self.kind.operation()
    }

    async fn run(&self, cx: &mut CaseContext) -> E2eResult<()> {
        match &self.kind {
            CaseKind::CreateViaApi { attributes } => create_via_api(cx, attributes).await,
            CaseKind::CreateViaWizard { attributes } => create_via_wizard(cx, attributes).await,
            CaseKind::DuplicateNameRejected => duplicate_name_rejected(cx).await,
            CaseKind::SetDefault => set_default(cx).await,
            CaseKind::LastProfileProtection => last_profile_protection(cx).await,
            CaseKind::Duplicate { attributes } => duplicate(cx, attributes).await,
            CaseKind::Rename => rename(cx).await,
            CaseKind::LoadVsDefault => load_vs_default(cx).await,
            CaseKind::WizardGuards => wizard_guards(cx).await,
            CaseKind::DeleteViaUi => delete_via_ui(cx).await,
            CaseKind::SessionRestore => session_restore(cx).await,
        }
    }
}

/// The operation must fail with an error accepted by `expected`
fn expect_failure<T>(result: E2eResult<T>, what: &str, expected: impl Fn(&E2eError) -> bool) -> E2eResult<E2eError> {
    match result {
        Ok(_) => Err(E2eError::AssertionFailed(format!("{} unexpectedly succeeded", what))),
        Err(e) if expected(&e) => Ok(e),
        Err(e) => Err(e),
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
    if condition {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(message()))
    }
}

/// Expectation for the attributes a request set explicitly
fn expected_overrides(name: &str, attributes: &ProfileAttributes) -> Expected {
    let mut expected = Expected::new().name(name);
    if attributes.description.is_some() {
        expected = expected.description(attributes.description.as_deref());
    }
    if attributes.slide_style_id.is_some() {
        expected = expected.slide_style(attributes.slide_style_id);
    }
    expected
}

async fn create_via_api(cx: &mut CaseContext, attributes: &ProfileAttributes) -> E2eResult<()> {
    // Creation is the operation under test here, not setup
    cx.enter(Phase::Act);
    let fixture = cx.fixture(Some(attributes)).await?;

    cx.enter(Phase::Verify);
    let profile = cx.provisioner.api().get_profile(fixture.id).await?;
    ensure(profile.id > 0, || format!("server allocated id {}", profile.id))?;
    ensure(!profile.created_by.is_empty(), || "created_by is empty".to_string())?;
    ensure(!profile.updated_by.is_empty(), || "updated_by is empty".to_string())?;
    ensure(profile.created_at <= profile.updated_at, || {
        format!("created_at {} is after updated_at {}", profile.created_at, profile.updated_at)
    })?;
    if let Some(prompt) = attributes.deck_prompt_id {
        ensure(profile.deck_prompt_id == Some(prompt), || {
            format!("deck prompt is {:?}, expected {}", profile.deck_prompt_id, prompt)
        })?;
    }
    if attributes.genie_space.is_some() {
        ensure(profile.genie_space == attributes.genie_space, || {
            format!("genie space is {:?}, expected {:?}", profile.genie_space, attributes.genie_space)
        })?;
    }

    cx.verifier
        .verify(fixture.id, &expected_overrides(&fixture.name, attributes).is_default(false))
        .await
}

async fn create_via_wizard(cx: &mut CaseContext, attributes: &ProfileAttributes) -> E2eResult<()> {
    let mut attributes = attributes.clone();
    if attributes.slide_style_id.is_none() {
        let styles = cx.provisioner.api().list_slide_styles().await?;
        let style = styles
            .first()
            .ok_or_else(|| E2eError::FixtureSetup("backend offers no slide styles".to_string()))?;
        attributes.slide_style_id = Some(style.id);
    }
    let name = fixture_name("Wizard");
    let draft = WizardDraft::named(&name).with_attributes(&attributes);

    cx.enter(Phase::Act);
    let result = cx.driver.create_via_wizard(&draft).await;
    // Whatever got created is ours to delete, even when the run failed halfway
    let created = cx.adopt(&name).await;
    result?;
    let profile = created?;

    cx.enter(Phase::Verify);
    ensure(profile.genie_space == attributes.genie_space, || {
        format!("genie space is {:?}, expected {:?}", profile.genie_space, attributes.genie_space)
    })?;
    cx.verifier
        .verify(profile.id, &expected_overrides(&name, &attributes).is_default(false))
        .await
}

async fn duplicate_name_rejected(cx: &mut CaseContext) -> E2eResult<()> {
    let fixture = cx.fixture(None).await?;

    cx.enter(Phase::Act);
    let attempt = cx.provisioner.create(&fixture.name, None).await;
    if let Ok(id) = &attempt {
        cx.defer(CleanupAction::DeleteProfile(*id));
    }
    let err = expect_failure(attempt, "creating a duplicate name", E2eError::is_conflict)?;
    ensure(err.to_string() == conflict_detail(&fixture.name), || {
        format!("conflict detail was {:?}", err.to_string())
    })?;

    // The wizard refuses the taken name before anything is sent
    let draft = WizardDraft::named(&fixture.name);
    let guard = expect_failure(cx.driver.create_via_wizard(&draft).await, "wizard with a taken name", |e| {
        matches!(e, E2eError::Validation(GuardError::NameTaken(_)))
    })?;
    info!("Wizard refused the taken name: {}", guard);

    cx.enter(Phase::Verify);
    let same_name = cx
        .provisioner
        .api()
        .list_profiles()
        .await?
        .into_iter()
        .filter(|p| p.name == fixture.name)
        .count();
    ensure(same_name == 1, || {
        format!("{} profiles are named '{}'", same_name, fixture.name)
    })?;
    cx.verifier.verify(fixture.id, &Expected::new().name(&fixture.name)).await
}

async fn set_default(cx: &mut CaseContext) -> E2eResult<()> {
    cx.preserve_default().await?;
    let fixture = cx.fixture(None).await?;

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    cx.driver.set_default(&mut session, fixture.id).await?;
    cx.session = session;

    cx.enter(Phase::Verify);
    cx.verifier.verify_single_default(&fixture.name).await?;
    cx.verifier
        .verify(fixture.id, &Expected::new().name(&fixture.name).is_default(true))
        .await
}

async fn last_profile_protection(cx: &mut CaseContext) -> E2eResult<()> {
    let profiles = cx.provisioner.api().list_profiles().await?;
    let [only] = profiles.as_slice() else {
        cx.skip(format!("backend holds {} profiles", profiles.len()));
        return Ok(());
    };
    let only = only.clone();

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    expect_failure(
        cx.driver.delete(&mut session, only.id).await,
        "deleting the last profile through the UI",
        |e| matches!(e, E2eError::LastEntity(_)),
    )?;
    expect_failure(
        cx.provisioner.delete(only.id).await,
        "deleting the last profile through the API",
        |e| matches!(e, E2eError::LastEntity(_)),
    )?;

    cx.enter(Phase::Verify);
    let after = cx.provisioner.api().list_profiles().await?;
    ensure(after == profiles, || "store changed after refused delete".to_string())?;
    cx.verifier.verify(only.id, &Expected::of_profile(&only)).await
}

async fn duplicate(cx: &mut CaseContext, attributes: &ProfileAttributes) -> E2eResult<()> {
    let source = cx.fixture(Some(attributes)).await?;
    let source_profile = cx.provisioner.api().get_profile(source.id).await?;
    let copy_name = fixture_name("Duplicate Copy");

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    let result = cx.driver.duplicate(&mut session, source.id, &copy_name).await;
    let created = cx.adopt(&copy_name).await;
    result?;
    let copy = created?;

    // A second copy under the same name is refused with the server's text
    let err = expect_failure(
        cx.driver.duplicate(&mut session, source.id, &copy_name).await,
        "duplicating onto a taken name",
        E2eError::is_conflict,
    )?;
    ensure(err.to_string() == conflict_detail(&copy_name), || {
        format!("dialog showed {:?}", err.to_string())
    })?;

    cx.enter(Phase::Verify);
    ensure(copy.id != source.id, || "duplicate reused the source id".to_string())?;
    check_same_associations(&source_profile, &copy)?;
    cx.verifier
        .verify(
            copy.id,
            &Expected::new()
                .name(&copy_name)
                .is_default(false)
                .slide_style(source_profile.slide_style_id),
        )
        .await
}

fn check_same_associations(source: &Profile, copy: &Profile) -> E2eResult<()> {
    ensure(copy.slide_style_id == source.slide_style_id, || {
        format!("slide style {:?} != {:?}", copy.slide_style_id, source.slide_style_id)
    })?;
    ensure(copy.deck_prompt_id == source.deck_prompt_id, || {
        format!("deck prompt {:?} != {:?}", copy.deck_prompt_id, source.deck_prompt_id)
    })?;
    ensure(copy.genie_space == source.genie_space, || {
        format!("genie space {:?} != {:?}", copy.genie_space, source.genie_space)
    })
}

async fn rename(cx: &mut CaseContext) -> E2eResult<()> {
    let fixture = cx.fixture(None).await?;
    let profile = cx.provisioner.api().get_profile(fixture.id).await?;
    let new_name = fixture_name("Rename Updated");

    cx.enter(Phase::Act);
    let draft = WizardDraft {
        name: new_name.clone(),
        ..WizardDraft::from_profile(&profile)
    };
    cx.driver.edit_via_wizard(&profile, &draft).await?;

    cx.enter(Phase::Verify);
    let renamed = cx
        .provisioner
        .get_by_name(&new_name)
        .await?
        .ok_or_else(|| E2eError::AssertionFailed(format!("'{}' not found after rename", new_name)))?;
    ensure(renamed.id == fixture.id, || {
        format!("rename produced id {}, expected {}", renamed.id, fixture.id)
    })?;
    ensure(cx.provisioner.get_by_name(&fixture.name).await?.is_none(), || {
        format!("old name '{}' still resolves", fixture.name)
    })?;
    cx.verifier.verify(fixture.id, &Expected::new().name(&new_name)).await
}

async fn load_vs_default(cx: &mut CaseContext) -> E2eResult<()> {
    cx.preserve_loaded().await?;
    cx.preserve_default().await?;
    let a = cx.fixture_for("Load A", None).await?;
    let b = cx.fixture_for("Load B", None).await?;

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    cx.driver.load_profile(&mut session, b.id).await?;
    cx.session = session.clone();
    cx.verifier.verify_loaded(&cx.session, b.id, &b.name).await?;
    cx.driver.set_default(&mut session, a.id).await?;
    cx.session = session;

    cx.enter(Phase::Verify);
    let current = cx.provisioner.api().current_profile().await?;
    ensure(current.id == b.id, || {
        format!("current profile is {}, expected {}", current.name, b.name)
    })?;
    cx.verifier
        .verify(a.id, &Expected::new().is_default(true).is_loaded(false))
        .await?;
    cx.verifier
        .verify(b.id, &Expected::new().is_default(false).is_loaded(true))
        .await?;

    let rows = cx.driver.rows().await?;
    let row_a = row_named(&rows, &a.name).ok_or_else(|| E2eError::AssertionFailed(format!("row '{}' missing", a.name)))?;
    let row_b = row_named(&rows, &b.name).ok_or_else(|| E2eError::AssertionFailed(format!("row '{}' missing", b.name)))?;
    ensure(row_a.has_badge(Badge::Default) && !row_a.has_badge(Badge::Loaded), || {
        format!("row A badges: {:?}", row_a.badges)
    })?;
    ensure(row_b.has_badge(Badge::Loaded) && !row_b.has_badge(Badge::Default), || {
        format!("row B badges: {:?}", row_b.badges)
    })
}

async fn wizard_guards(cx: &mut CaseContext) -> E2eResult<()> {
    let taken = cx.fixture(None).await?;
    let rows = cx.driver.rows().await?;
    let ui = cx.driver.ui().clone();

    cx.enter(Phase::Act);
    ui.open_wizard().await?;
    let mut wizard = ProfileWizard::create(rows.into_iter().map(|r| r.name));
    cx.driver.expect_step(&wizard).await?;

    // Empty name
    cx.driver.check_controls(&wizard).await?;
    ensure(!wizard.is_enabled(WizardControl::Next), || "Next enabled for an empty name".to_string())?;

    // Taken name
    ui.fill_wizard(WizardField::Name, &taken.name).await?;
    wizard.set_name(taken.name.clone());
    cx.driver.check_controls(&wizard).await?;
    ensure(!wizard.is_enabled(WizardControl::Next), || "Next enabled for a taken name".to_string())?;

    // Fresh name
    let name = fixture_name("Guards");
    ui.fill_wizard(WizardField::Name, &name).await?;
    wizard.set_name(name);
    cx.driver.check_controls(&wizard).await?;
    ensure(wizard.is_enabled(WizardControl::Next), || "Next disabled for a fresh name".to_string())?;
    ui.click_wizard(WizardControl::Next).await?;
    wizard.next()?;

    ui.click_wizard(WizardControl::Skip).await?;
    wizard.skip()?;
    cx.driver.expect_step(&wizard).await?;

    // No style selected
    cx.enter(Phase::Verify);
    ensure(wizard.step() == WizardStep::SlideStyle, || format!("at {:?}", wizard.step()))?;
    cx.driver.check_controls(&wizard).await?;

    let style = cx
        .provisioner
        .api()
        .list_slide_styles()
        .await?
        .first()
        .map(|s| s.id)
        .ok_or_else(|| E2eError::FixtureSetup("backend offers no slide styles".to_string()))?;
    ui.pick_in_wizard(&WizardPick::SlideStyle(style)).await?;
    wizard.set_slide_style(Some(style));
    cx.driver.check_controls(&wizard).await?;
    ensure(wizard.is_enabled(WizardControl::Next), || "Next disabled after picking a style".to_string())
}

async fn delete_via_ui(cx: &mut CaseContext) -> E2eResult<()> {
    let fixture = cx.fixture(None).await?;

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    cx.driver.delete(&mut session, fixture.id).await?;
    cx.session = session;

    cx.enter(Phase::Verify);
    cx.verifier.verify_absent(fixture.id).await
}

async fn session_restore(cx: &mut CaseContext) -> E2eResult<()> {
    cx.preserve_loaded().await?;
    let a = cx.fixture_for("Session A", None).await?;
    let b = cx.fixture_for("Session B", None).await?;

    cx.enter(Phase::Act);
    let mut session = cx.session.clone();
    cx.driver.load_profile(&mut session, a.id).await?;
    let created = cx.provisioner.api().create_session().await?;
    ensure(created.profile_id == a.id, || {
        format!("session bound to {}, expected {}", created.profile_id, a.id)
    })?;
    session.session_id = Some(created.id.clone());

    cx.driver.load_from_list(&mut session, b.id).await?;
    let outcome = cx.provisioner.api().restore_session(&created.id).await?;
    ensure(outcome.switched && outcome.profile_id == a.id, || {
        format!("restore reported {:?}", outcome)
    })?;
    session.current_profile = Some(outcome.profile_id);
    cx.session = session;

    cx.enter(Phase::Verify);
    let stored = cx.provisioner.api().get_session(&created.id).await?;
    ensure(stored.profile_id == a.id, || "session association changed".to_string())?;
    cx.verifier.verify_loaded(&cx.session, a.id, &a.name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_keys_match_scenario_tags() {
        let keys: Vec<String> = CaseKind::all().iter().map(CaseKind::key).collect();
        assert!(keys.contains(&"create_via_api".to_string()));
        assert!(keys.contains(&"load_vs_default".to_string()));
        assert!(keys.contains(&"session_restore".to_string()));
        assert_eq!(keys.len(), 11);
    }

    #[test]
    fn test_case_kind_from_yaml() {
        let kind: CaseKind = serde_yaml::from_str(
            "case: duplicate\nattributes:\n  slide_style_id: 3\n  deck_prompt_id: 5\n",
        )
        .unwrap();
        assert_eq!(
            kind,
            CaseKind::Duplicate {
                attributes: ProfileAttributes::default().with_slide_style(3).with_deck_prompt(5),
            }
        );
        assert_eq!(kind.operation(), "Duplicate");
    }

    #[test]
    fn test_expect_failure() {
        let ok: E2eResult<()> = Ok(());
        assert!(matches!(
            expect_failure(ok, "x", |_| true),
            Err(E2eError::AssertionFailed(_))
        ));

        let conflict: E2eResult<()> = Err(E2eError::Conflict {
            name: "a".to_string(),
            detail: "d".to_string(),
        });
        assert!(expect_failure(conflict, "x", E2eError::is_conflict).is_ok());
    }
}
