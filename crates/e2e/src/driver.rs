//! UI action driver
//!
//! Performs profile mutations the way a user would, through a `UiSurface`.
//! Wizard runs are mirrored into a `ProfileWizard` and every rendered control
//! is compared with the machine's guard before anything is clicked. A
//! disabled control is asserted, never clicked.

use profile_e2e_common::{Profile, ProfileId, LAST_PROFILE_DETAIL};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Channel, E2eError, E2eResult};
use crate::ui::{row_named, Badge, ProfileRow, RowAction, UiSurface, WizardField, WizardPick};
use crate::wizard::{ProfileWizard, WizardControl, WizardDraft, WizardStep, ALL_CONTROLS};

/// Session-scoped state threaded explicitly through the driver and verifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Profile this session believes is loaded
    pub current_profile: Option<ProfileId>,
    /// Backend session created during the case, if any
    pub session_id: Option<String>,
}

impl SessionContext {
    pub fn with_current(profile_id: ProfileId) -> Self {
        Self {
            current_profile: Some(profile_id),
            session_id: None,
        }
    }
}

#[derive(Clone)]
pub struct UiDriver {
    ui: Arc<dyn UiSurface>,
}

impl UiDriver {
    pub fn new(ui: Arc<dyn UiSurface>) -> Self {
        Self { ui }
    }

    pub fn ui(&self) -> &Arc<dyn UiSurface> {
        &self.ui
    }

    /// Fresh list rows
    pub async fn rows(&self) -> E2eResult<Vec<ProfileRow>> {
        self.ui.open_profiles().await?;
        self.ui.rows().await
    }

    async fn row_for(&self, id: ProfileId) -> E2eResult<(ProfileRow, Vec<ProfileRow>)> {
        let rows = self.rows().await?;
        let row = rows
            .iter()
            .find(|r| r.id == Some(id))
            .cloned()
            .ok_or_else(|| E2eError::not_found("profile", id, Channel::Ui))?;
        Ok((row, rows))
    }

    // ========================================================================
    // Wizard
    // ========================================================================

    /// Create a profile through the wizard; returns the submitted name
    pub async fn create_via_wizard(&self, draft: &WizardDraft) -> E2eResult<String> {
        let rows = self.rows().await?;
        let taken = rows.into_iter().map(|r| r.name);

        self.ui.open_wizard().await?;
        let mut wizard = ProfileWizard::create(taken);
        info!("Creating profile '{}' through the wizard", draft.name);
        self.drive(&mut wizard, draft).await
    }

    /// Edit `profile` through the wizard; returns the saved name
    pub async fn edit_via_wizard(&self, profile: &Profile, draft: &WizardDraft) -> E2eResult<String> {
        let rows = self.rows().await?;
        if row_named(&rows, &profile.name).is_none() {
            return Err(E2eError::not_found("profile", profile.id, Channel::Ui));
        }
        let taken: Vec<String> = rows.into_iter().map(|r| r.name).collect();

        self.ui.row_action(&profile.name, RowAction::Edit).await?;
        let mut wizard = ProfileWizard::edit(profile, taken);
        info!("Editing profile '{}' through the wizard", profile.name);
        self.drive(&mut wizard, draft).await
    }

    async fn drive(&self, wizard: &mut ProfileWizard, draft: &WizardDraft) -> E2eResult<String> {
        self.expect_step(wizard).await?;

        // Step 1
        self.ui.fill_wizard(WizardField::Name, &draft.name).await?;
        wizard.set_name(draft.name.clone());
        if let Some(description) = &draft.description {
            self.ui.fill_wizard(WizardField::Description, description).await?;
            wizard.set_description(Some(description.clone()));
        }
        self.advance(wizard, WizardControl::Next).await?;

        // Step 2 (optional)
        match &draft.genie_space {
            Some(space) => {
                self.ui.pick_in_wizard(&WizardPick::GenieSpace(space.space_id.clone())).await?;
                wizard.set_genie_space(Some(space.clone()));
                self.advance(wizard, WizardControl::Next).await?;
            }
            None => self.advance(wizard, WizardControl::Skip).await?,
        }

        // Step 3 (required)
        if let Some(style_id) = draft.slide_style_id {
            self.ui.pick_in_wizard(&WizardPick::SlideStyle(style_id)).await?;
            wizard.set_slide_style(Some(style_id));
        }
        self.advance(wizard, WizardControl::Next).await?;

        // Step 4 (optional)
        match draft.deck_prompt_id {
            Some(prompt_id) => {
                self.ui.pick_in_wizard(&WizardPick::DeckPrompt(prompt_id)).await?;
                wizard.set_deck_prompt(Some(prompt_id));
                self.advance(wizard, WizardControl::Next).await?;
            }
            None => self.advance(wizard, WizardControl::Skip).await?,
        }

        // Step 5
        self.check_controls(wizard).await?;
        self.ui.click_wizard(WizardControl::Submit).await?;

        let view = self.ui.wizard().await?;
        match view.step {
            None | Some(WizardStep::Submitted) => {
                wizard.accept();
                Ok(wizard.draft().name.clone())
            }
            Some(WizardStep::Review) => {
                let detail = view.error.unwrap_or_default();
                wizard.reject(detail.clone());
                debug!("Wizard submit rejected: {}", detail);
                Err(E2eError::Conflict {
                    name: wizard.draft().name.clone(),
                    detail,
                })
            }
            Some(other) => Err(E2eError::AssertionFailed(format!(
                "wizard moved to {:?} after submit",
                other
            ))),
        }
    }

    /// Compare every wizard control with the machine's guard
    pub async fn check_controls(&self, wizard: &ProfileWizard) -> E2eResult<()> {
        for control in ALL_CONTROLS {
            let expected = wizard.is_enabled(control);
            let actual = self.ui.wizard_control_enabled(control).await?;
            if expected != actual {
                return Err(E2eError::GuardMismatch {
                    step: wizard.step(),
                    control,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// The rendered wizard must sit on the machine's step
    pub async fn expect_step(&self, wizard: &ProfileWizard) -> E2eResult<()> {
        let view = self.ui.wizard().await?;
        if view.step != Some(wizard.step()) {
            return Err(E2eError::AssertionFailed(format!(
                "wizard shows {:?}, expected {:?}",
                view.step,
                wizard.step()
            )));
        }
        Ok(())
    }

    /// Press `control` when its guard allows it; otherwise assert that the
    /// UI renders it disabled and report the guard
    async fn advance(&self, wizard: &mut ProfileWizard, control: WizardControl) -> E2eResult<()> {
        self.check_controls(wizard).await?;

        wizard.check(control)?;
        self.ui.click_wizard(control).await?;
        match control {
            WizardControl::Skip => wizard.skip()?,
            _ => wizard.next()?,
        };
        self.expect_step(wizard).await
    }

    // ========================================================================
    // List and selector operations
    // ========================================================================

    /// Load a profile through the selector dropdown
    pub async fn load_profile(&self, session: &mut SessionContext, id: ProfileId) -> E2eResult<()> {
        let (row, _) = self.row_for(id).await?;
        self.ui.choose_in_selector(&row.name).await?;
        session.current_profile = Some(id);
        info!("Loaded profile '{}' through the selector", row.name);
        Ok(())
    }

    /// Load a profile through its row action
    pub async fn load_from_list(&self, session: &mut SessionContext, id: ProfileId) -> E2eResult<()> {
        let (row, _) = self.row_for(id).await?;
        self.ui.row_action(&row.name, RowAction::Load).await?;
        session.current_profile = Some(id);
        Ok(())
    }

    /// Move the Default badge to `id`
    pub async fn set_default(&self, _session: &mut SessionContext, id: ProfileId) -> E2eResult<()> {
        let (row, _) = self.row_for(id).await?;
        self.ui.row_action(&row.name, RowAction::SetDefault).await?;

        let rows = self.rows().await?;
        let defaults: Vec<&str> = rows
            .iter()
            .filter(|r| r.has_badge(Badge::Default))
            .map(|r| r.name.as_str())
            .collect();
        if defaults.len() > 1 {
            return Err(E2eError::AssertionFailed(format!(
                "{} Default badges shown at once: {:?}",
                defaults.len(),
                defaults
            )));
        }
        info!("Set '{}' as default", row.name);
        Ok(())
    }

    /// Duplicate `id` as `new_name`; a dialog error surfaces as `Conflict`
    pub async fn duplicate(&self, _session: &mut SessionContext, id: ProfileId, new_name: &str) -> E2eResult<()> {
        let (row, _) = self.row_for(id).await?;
        self.ui.row_action(&row.name, RowAction::Duplicate).await?;
        self.ui.submit_duplicate_dialog(new_name).await?;

        if let Some(detail) = self.ui.duplicate_dialog_error().await? {
            return Err(E2eError::Conflict {
                name: new_name.to_string(),
                detail,
            });
        }
        info!("Duplicated '{}' as '{}'", row.name, new_name);
        Ok(())
    }

    /// Delete `id` through its row; with a single profile left the Delete
    /// control must be absent and `LastEntity` is returned without clicking
    pub async fn delete(&self, session: &mut SessionContext, id: ProfileId) -> E2eResult<()> {
        let (row, rows) = self.row_for(id).await?;

        if rows.len() == 1 {
            if row.offers(RowAction::Delete) {
                return Err(E2eError::AssertionFailed(format!(
                    "Delete is offered for '{}', the last profile",
                    row.name
                )));
            }
            return Err(E2eError::LastEntity(LAST_PROFILE_DETAIL.to_string()));
        }
        if !row.offers(RowAction::Delete) {
            return Err(E2eError::AssertionFailed(format!(
                "Delete is missing for '{}' while {} profiles exist",
                row.name,
                rows.len()
            )));
        }

        self.ui.row_action(&row.name, RowAction::Delete).await?;
        if session.current_profile == Some(id) {
            // The backend falls back to another profile; the session no longer knows which
            session.current_profile = None;
        }
        info!("Deleted '{}' through the list", row.name);
        Ok(())
    }
}
