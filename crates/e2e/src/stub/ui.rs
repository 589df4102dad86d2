//! Simulated profile UI
//!
//! Renders a `ProfileStore` the way the real page does: selector, list rows,
//! duplicate dialog and the five-step wizard. `Faults` make the rendering
//! drift from the store so the verifier and driver can be shown to notice.

use async_trait::async_trait;
use parking_lot::Mutex;
use profile_e2e_common::{GenieSpace, ProfileId, ProfileStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Channel, E2eError, E2eResult};
use crate::stub::api::STUB_ACTOR;
use crate::ui::{
    Badge, ProfileRow, RowAction, SelectorEntry, SelectorView, UiSurface, WizardField,
    WizardPick, WizardView,
};
use crate::wizard::{ProfileWizard, Submission, WizardControl, WizardStep};

/// Deliberate rendering defects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faults {
    /// Rows keep the description they were first rendered with
    pub stale_description: bool,
    /// The Default badge is never drawn
    pub hide_default_badge: bool,
    /// Next renders enabled whatever its guard says
    pub next_always_enabled: bool,
}

#[derive(Default)]
struct Page {
    wizard: Option<ProfileWizard>,
    /// Source profile and error text of the open duplicate dialog
    duplicate: Option<(ProfileId, Option<String>)>,
    first_descriptions: HashMap<ProfileId, Option<String>>,
}

pub struct SimulatedUi {
    store: ProfileStore,
    faults: Faults,
    genie_spaces: Vec<GenieSpace>,
    snapshot_dir: Option<PathBuf>,
    page: Mutex<Page>,
}

impl SimulatedUi {
    pub fn new(store: ProfileStore) -> Self {
        Self {
            store,
            faults: Faults::default(),
            genie_spaces: vec![
                GenieSpace {
                    space_id: "space-e2e".to_string(),
                    space_name: "E2E Space".to_string(),
                },
                GenieSpace {
                    space_id: "space-sales".to_string(),
                    space_name: "Sales Space".to_string(),
                },
            ],
            snapshot_dir: None,
            page: Mutex::new(Page::default()),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Write a JSON snapshot of the page when a screenshot is requested
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    fn render_rows(&self) -> E2eResult<Vec<ProfileRow>> {
        let profiles = self.store.list_profiles()?;
        let current = self.store.current_profile()?.id;
        let single = profiles.len() == 1;
        let mut page = self.page.lock();

        Ok(profiles
            .into_iter()
            .map(|p| {
                let description = if self.faults.stale_description {
                    page.first_descriptions
                        .entry(p.id)
                        .or_insert_with(|| p.description.clone())
                        .clone()
                } else {
                    p.description.clone()
                };

                let mut badges = Vec::new();
                if p.is_default && !self.faults.hide_default_badge {
                    badges.push(Badge::Default);
                }
                if p.id == current {
                    badges.push(Badge::Loaded);
                }

                let actions = RowAction::ALL
                    .into_iter()
                    .filter(|a| !(single && *a == RowAction::Delete))
                    .collect();

                ProfileRow {
                    id: Some(p.id),
                    name: p.name,
                    description,
                    badges,
                    actions,
                }
            })
            .collect())
    }

    fn profile_named(&self, name: &str) -> E2eResult<profile_e2e_common::Profile> {
        self.store
            .find_by_name(name)?
            .ok_or_else(|| E2eError::not_found("profile", name, Channel::Ui))
    }

    fn taken_names(&self) -> E2eResult<Vec<String>> {
        Ok(self.store.list_profiles()?.into_iter().map(|p| p.name).collect())
    }

    fn rendered_enabled(&self, wizard: &ProfileWizard, control: WizardControl) -> bool {
        let forced = self.faults.next_always_enabled
            && control == WizardControl::Next
            && wizard.step() != WizardStep::Review;
        forced || wizard.is_enabled(control)
    }

    fn with_wizard<T>(&self, f: impl FnOnce(&mut ProfileWizard) -> E2eResult<T>) -> E2eResult<T> {
        let mut page = self.page.lock();
        let wizard = page
            .wizard
            .as_mut()
            .ok_or_else(|| E2eError::not_found("wizard", "open", Channel::Ui))?;
        f(wizard)
    }

    fn submit(&self, wizard: &mut ProfileWizard) -> E2eResult<bool> {
        let result = match wizard.submission()? {
            Submission::Create(request) => self.store.create_profile(&request, STUB_ACTOR),
            Submission::Update(id, update) => self.store.update_profile(id, &update, STUB_ACTOR),
        };
        match wizard.settle(result.map_err(E2eError::from)) {
            Ok(profile) => {
                debug!("Wizard saved profile {}", profile.id);
                Ok(true)
            }
            Err(E2eError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl UiSurface for SimulatedUi {
    async fn open_profiles(&self) -> E2eResult<()> {
        let mut page = self.page.lock();
        page.wizard = None;
        page.duplicate = None;
        Ok(())
    }

    async fn selector(&self) -> E2eResult<SelectorView> {
        let current = self.store.current_profile()?;
        let entries = self
            .store
            .list_profiles()?
            .into_iter()
            .map(|p| SelectorEntry {
                loaded: p.id == current.id,
                name: p.name,
            })
            .collect();
        Ok(SelectorView {
            label: format!("Profile: {}", current.name),
            default_badge: current.is_default && !self.faults.hide_default_badge,
            entries,
        })
    }

    async fn choose_in_selector(&self, name: &str) -> E2eResult<()> {
        let profile = self.profile_named(name)?;
        self.store.load_profile(profile.id)?;
        Ok(())
    }

    async fn rows(&self) -> E2eResult<Vec<ProfileRow>> {
        self.render_rows()
    }

    async fn row_action(&self, name: &str, action: RowAction) -> E2eResult<()> {
        let row = self
            .render_rows()?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| E2eError::not_found("profile", name, Channel::Ui))?;
        if !row.offers(action) {
            return Err(E2eError::not_found("row action", action.as_str(), Channel::Ui));
        }
        let profile = self.profile_named(name)?;

        match action {
            RowAction::View => {}
            RowAction::Load => {
                self.store.load_profile(profile.id)?;
            }
            RowAction::SetDefault => {
                self.store.set_default(profile.id, STUB_ACTOR)?;
            }
            RowAction::Duplicate => {
                self.page.lock().duplicate = Some((profile.id, None));
            }
            RowAction::Edit => {
                let wizard = ProfileWizard::edit(&profile, self.taken_names()?);
                self.page.lock().wizard = Some(wizard);
            }
            RowAction::Delete => {
                self.store.delete_profile(profile.id)?;
            }
        }
        Ok(())
    }

    async fn submit_duplicate_dialog(&self, new_name: &str) -> E2eResult<()> {
        let source = self
            .page
            .lock()
            .duplicate
            .as_ref()
            .map(|(id, _)| *id)
            .ok_or_else(|| E2eError::not_found("duplicate dialog", "open", Channel::Ui))?;

        match self.store.duplicate_profile(source, new_name, STUB_ACTOR) {
            Ok(_) => {
                self.page.lock().duplicate = None;
                Ok(())
            }
            Err(profile_e2e_common::Error::Conflict { detail, .. }) => {
                self.page.lock().duplicate = Some((source, Some(detail)));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn duplicate_dialog_error(&self) -> E2eResult<Option<String>> {
        Ok(self.page.lock().duplicate.as_ref().and_then(|(_, error)| error.clone()))
    }

    async fn open_wizard(&self) -> E2eResult<()> {
        let wizard = ProfileWizard::create(self.taken_names()?);
        self.page.lock().wizard = Some(wizard);
        Ok(())
    }

    async fn wizard(&self) -> E2eResult<WizardView> {
        let page = self.page.lock();
        Ok(match &page.wizard {
            Some(wizard) if wizard.step() != WizardStep::Submitted => WizardView {
                step: Some(wizard.step()),
                error: wizard.server_error().map(str::to_string),
            },
            _ => WizardView { step: None, error: None },
        })
    }

    async fn fill_wizard(&self, field: WizardField, value: &str) -> E2eResult<()> {
        self.with_wizard(|wizard| {
            match field {
                WizardField::Name => wizard.set_name(value),
                WizardField::Description => {
                    wizard.set_description(Some(value.to_string()).filter(|v| !v.is_empty()))
                }
            }
            Ok(())
        })
    }

    async fn pick_in_wizard(&self, pick: &WizardPick) -> E2eResult<()> {
        let space = match pick {
            WizardPick::GenieSpace(id) => Some(
                self.genie_spaces
                    .iter()
                    .find(|s| &s.space_id == id)
                    .cloned()
                    .ok_or_else(|| E2eError::not_found("genie space", id, Channel::Ui))?,
            ),
            _ => None,
        };

        self.with_wizard(|wizard| {
            match pick {
                WizardPick::GenieSpace(_) => wizard.set_genie_space(space),
                WizardPick::SlideStyle(id) => wizard.set_slide_style(Some(*id)),
                WizardPick::DeckPrompt(id) => wizard.set_deck_prompt(Some(*id)),
            }
            Ok(())
        })
    }

    async fn wizard_control_enabled(&self, control: WizardControl) -> E2eResult<bool> {
        self.with_wizard(|wizard| Ok(self.rendered_enabled(wizard, control)))
    }

    async fn click_wizard(&self, control: WizardControl) -> E2eResult<()> {
        let mut page = self.page.lock();
        let wizard = page
            .wizard
            .as_mut()
            .ok_or_else(|| E2eError::not_found("wizard", "open", Channel::Ui))?;

        if !self.rendered_enabled(wizard, control) {
            return Err(E2eError::Timeout(format!("{:?} to become enabled", control)));
        }

        match control {
            WizardControl::Submit => {
                if self.submit(wizard)? {
                    page.wizard = None;
                }
            }
            // A forced-enabled Next whose guard fails does nothing
            WizardControl::Next => {
                let _ = wizard.next();
            }
            WizardControl::Skip => {
                wizard.skip()?;
            }
        }
        Ok(())
    }

    async fn screenshot(&self, name: &str) -> E2eResult<Option<PathBuf>> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;

        let snapshot = serde_json::json!({
            "selector": self.selector().await?,
            "rows": self.render_rows()?,
            "wizard": self.wizard().await?,
        });
        let path = dir.join(format!("{}.json", name));
        std::fs::write(&path, serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile_e2e_common::{NewProfile, ProfileAttributes, ProfileUpdate};

    fn store_with(names: &[&str]) -> ProfileStore {
        let store = ProfileStore::open_memory().unwrap();
        for name in names {
            store
                .create_profile(
                    &NewProfile {
                        name: name.to_string(),
                        attributes: ProfileAttributes::default().with_description("first"),
                    },
                    "test",
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_single_profile_hides_delete() {
        let ui = SimulatedUi::new(store_with(&[]));
        let rows = ui.rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].offers(RowAction::Delete));
        assert!(rows[0].has_badge(Badge::Default));
        assert!(rows[0].has_badge(Badge::Loaded));
    }

    #[tokio::test]
    async fn test_selector_reflects_load() {
        let ui = SimulatedUi::new(store_with(&["Sales"]));
        ui.choose_in_selector("Sales").await.unwrap();

        let selector = ui.selector().await.unwrap();
        assert_eq!(selector.label, "Profile: Sales");
        assert!(!selector.default_badge);
        assert_eq!(selector.loaded_entries(), vec!["Sales"]);
    }

    #[tokio::test]
    async fn test_stale_description_fault() {
        let store = store_with(&["Ops"]);
        let ui = SimulatedUi::new(store.clone()).with_faults(Faults {
            stale_description: true,
            ..Faults::default()
        });
        let id = store.find_by_name("Ops").unwrap().unwrap().id;
        ui.rows().await.unwrap();

        let update = ProfileUpdate::patch(ProfileAttributes::default().with_description("second"));
        store.update_profile(id, &update, "test").unwrap();

        let rows = ui.rows().await.unwrap();
        let row = rows.iter().find(|r| r.id == Some(id)).unwrap();
        assert_eq!(row.description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_duplicate_dialog_keeps_conflict_text() {
        let ui = SimulatedUi::new(store_with(&["A", "B"]));
        ui.row_action("A", RowAction::Duplicate).await.unwrap();
        ui.submit_duplicate_dialog("B").await.unwrap();
        assert_eq!(
            ui.duplicate_dialog_error().await.unwrap().as_deref(),
            Some("Profile with name 'B' already exists")
        );
    }

    #[tokio::test]
    async fn test_disabled_control_cannot_be_clicked() {
        let ui = SimulatedUi::new(store_with(&[]));
        ui.open_wizard().await.unwrap();
        assert!(!ui.wizard_control_enabled(WizardControl::Next).await.unwrap());
        assert!(ui.click_wizard(WizardControl::Next).await.is_err());

        let forced = SimulatedUi::new(store_with(&[])).with_faults(Faults {
            next_always_enabled: true,
            ..Faults::default()
        });
        forced.open_wizard().await.unwrap();
        assert!(forced.wizard_control_enabled(WizardControl::Next).await.unwrap());
    }
}
