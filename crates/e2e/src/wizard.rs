//! Profile creation wizard as an explicit finite-state machine
//!
//! ```text
//! Name ──Next──▶ GenieSpace ──Next/Skip──▶ SlideStyle ──Next──▶ DeckPrompt ──Next/Skip──▶ Review ──Submit──▶ Submitted
//!  │ guard: name non-empty       (optional)   │ guard: style chosen   (optional)       │ conflict: stay on Review
//!  │        and not taken                                                              │           with server detail
//! ```
//!
//! The machine never talks to a browser. The UI driver mirrors every click
//! into it and checks that the rendered controls agree with its guards.

use profile_e2e_common::{GenieSpace, NewProfile, Profile, ProfileAttributes, ProfileId, ProfileUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Name,
    GenieSpace,
    SlideStyle,
    DeckPrompt,
    Review,
    Submitted,
}

impl WizardStep {
    /// 1-based position as rendered in the wizard header
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::Name => 1,
            WizardStep::GenieSpace => 2,
            WizardStep::SlideStyle => 3,
            WizardStep::DeckPrompt => 4,
            WizardStep::Review => 5,
            WizardStep::Submitted => 6,
        }
    }

    fn following(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Name => Some(WizardStep::GenieSpace),
            WizardStep::GenieSpace => Some(WizardStep::SlideStyle),
            WizardStep::SlideStyle => Some(WizardStep::DeckPrompt),
            WizardStep::DeckPrompt => Some(WizardStep::Review),
            WizardStep::Review | WizardStep::Submitted => None,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, WizardStep::GenieSpace | WizardStep::DeckPrompt)
    }

    /// Parse the value of the wizard's step attribute
    pub fn from_attr(value: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(value.trim().to_string())).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardControl {
    Next,
    Skip,
    /// "Create" in create mode, "Save" in edit mode
    Submit,
}

pub const ALL_CONTROLS: [WizardControl; 3] =
    [WizardControl::Next, WizardControl::Skip, WizardControl::Submit];

/// A transition the wizard refuses; rendered as a disabled control
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("profile name is required")]
    EmptyName,

    #[error("profile name '{0}' is already taken")]
    NameTaken(String),

    #[error("a slide style must be selected")]
    StyleRequired,

    #[error("{control:?} is not available on step {step:?}")]
    Unavailable {
        step: WizardStep,
        control: WizardControl,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardMode {
    Create,
    Edit {
        profile_id: ProfileId,
        original_name: String,
    },
}

/// Values collected across the wizard steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genie_space: Option<GenieSpace>,
    #[serde(default)]
    pub slide_style_id: Option<i64>,
    #[serde(default)]
    pub deck_prompt_id: Option<i64>,
}

impl WizardDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            description: profile.description.clone(),
            genie_space: profile.genie_space.clone(),
            slide_style_id: profile.slide_style_id,
            deck_prompt_id: profile.deck_prompt_id,
        }
    }

    pub fn with_attributes(mut self, attributes: &ProfileAttributes) -> Self {
        self.description = attributes.description.clone();
        self.genie_space = attributes.genie_space.clone();
        self.slide_style_id = attributes.slide_style_id;
        self.deck_prompt_id = attributes.deck_prompt_id;
        self
    }

    pub fn attributes(&self) -> ProfileAttributes {
        ProfileAttributes {
            description: self.description.clone(),
            slide_style_id: self.slide_style_id,
            deck_prompt_id: self.deck_prompt_id,
            genie_space: self.genie_space.clone(),
        }
    }
}

/// Call the Review step issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Create(NewProfile),
    Update(ProfileId, ProfileUpdate),
}

#[derive(Debug, Clone)]
pub struct ProfileWizard {
    mode: WizardMode,
    step: WizardStep,
    draft: WizardDraft,
    taken_names: HashSet<String>,
    server_error: Option<String>,
}

impl ProfileWizard {
    /// Fresh wizard for a new profile; `taken_names` are the existing names
    pub fn create(taken_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode: WizardMode::Create,
            step: WizardStep::Name,
            draft: WizardDraft::default(),
            taken_names: taken_names.into_iter().collect(),
            server_error: None,
        }
    }

    /// Wizard pre-filled from an existing profile; its own name is not taken
    pub fn edit(profile: &Profile, taken_names: impl IntoIterator<Item = String>) -> Self {
        let mut taken: HashSet<String> = taken_names.into_iter().collect();
        taken.remove(&profile.name);
        Self {
            mode: WizardMode::Edit {
                profile_id: profile.id,
                original_name: profile.name.clone(),
            },
            step: WizardStep::Name,
            draft: WizardDraft::from_profile(profile),
            taken_names: taken,
            server_error: None,
        }
    }

    pub fn mode(&self) -> &WizardMode {
        &self.mode
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &WizardDraft {
        &self.draft
    }

    /// Server error shown on the Review step after a rejected submit
    pub fn server_error(&self) -> Option<&str> {
        self.server_error.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.draft.description = description;
    }

    pub fn set_genie_space(&mut self, space: Option<GenieSpace>) {
        self.draft.genie_space = space;
    }

    pub fn set_slide_style(&mut self, slide_style_id: Option<i64>) {
        self.draft.slide_style_id = slide_style_id;
    }

    pub fn set_deck_prompt(&mut self, deck_prompt_id: Option<i64>) {
        self.draft.deck_prompt_id = deck_prompt_id;
    }

    /// Guard for `control` on the current step
    pub fn check(&self, control: WizardControl) -> Result<(), GuardError> {
        let unavailable = GuardError::Unavailable {
            step: self.step,
            control,
        };

        match (control, self.step) {
            (WizardControl::Next, WizardStep::Name) => {
                let name = self.draft.name.trim();
                if name.is_empty() {
                    Err(GuardError::EmptyName)
                } else if self.taken_names.contains(self.draft.name.as_str()) {
                    Err(GuardError::NameTaken(self.draft.name.clone()))
                } else {
                    Ok(())
                }
            }
            (WizardControl::Next, WizardStep::SlideStyle) => match self.draft.slide_style_id {
                Some(_) => Ok(()),
                None => Err(GuardError::StyleRequired),
            },
            (WizardControl::Next, WizardStep::GenieSpace | WizardStep::DeckPrompt) => Ok(()),
            (WizardControl::Skip, step) if step.is_optional() => Ok(()),
            (WizardControl::Submit, WizardStep::Review) => Ok(()),
            _ => Err(unavailable),
        }
    }

    pub fn is_enabled(&self, control: WizardControl) -> bool {
        self.check(control).is_ok()
    }

    /// Advance one step through Next
    pub fn next(&mut self) -> Result<WizardStep, GuardError> {
        self.check(WizardControl::Next)?;
        self.advance()
    }

    /// Advance past an optional step, clearing its value
    pub fn skip(&mut self) -> Result<WizardStep, GuardError> {
        self.check(WizardControl::Skip)?;
        match self.step {
            WizardStep::GenieSpace => self.draft.genie_space = None,
            WizardStep::DeckPrompt => self.draft.deck_prompt_id = None,
            _ => {}
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<WizardStep, GuardError> {
        let next = self.step.following().ok_or(GuardError::Unavailable {
            step: self.step,
            control: WizardControl::Next,
        })?;
        debug!("Wizard {:?} -> {:?}", self.step, next);
        self.step = next;
        Ok(next)
    }

    /// The call Submit issues from the Review step
    pub fn submission(&self) -> Result<Submission, GuardError> {
        self.check(WizardControl::Submit)?;
        Ok(match &self.mode {
            WizardMode::Create => Submission::Create(NewProfile {
                name: self.draft.name.clone(),
                attributes: self.draft.attributes(),
            }),
            WizardMode::Edit {
                profile_id,
                original_name,
            } => Submission::Update(
                *profile_id,
                // Skipped steps clear their value, so the whole draft is sent
                ProfileUpdate::replacing(
                    (self.draft.name != *original_name).then(|| self.draft.name.clone()),
                    self.draft.attributes(),
                ),
            ),
        })
    }

    /// Record a successful submit
    pub fn accept(&mut self) {
        self.step = WizardStep::Submitted;
        self.server_error = None;
    }

    /// Record a rejected submit; the wizard stays on Review
    pub fn reject(&mut self, detail: impl Into<String>) {
        self.server_error = Some(detail.into());
    }

    /// Record the outcome of the submit call; a name conflict keeps the
    /// wizard on Review with the server's detail
    pub fn settle(&mut self, result: E2eResult<Profile>) -> E2eResult<Profile> {
        match result {
            Ok(profile) => {
                self.accept();
                Ok(profile)
            }
            Err(E2eError::Conflict { name, detail }) => {
                self.reject(detail.clone());
                Err(E2eError::Conflict { name, detail })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn at_review(name: &str) -> ProfileWizard {
        let mut wizard = ProfileWizard::create(Vec::new());
        wizard.set_name(name);
        wizard.next().unwrap();
        wizard.skip().unwrap();
        wizard.set_slide_style(Some(1));
        wizard.next().unwrap();
        wizard.skip().unwrap();
        wizard
    }

    #[test]
    fn test_guards_follow_name_and_style_inputs() {
        let mut wizard = ProfileWizard::create(vec!["Existing".to_string()]);
        assert!(!wizard.is_enabled(WizardControl::Next));
        assert_eq!(wizard.next(), Err(GuardError::EmptyName));

        wizard.set_name("Existing");
        assert_eq!(
            wizard.check(WizardControl::Next),
            Err(GuardError::NameTaken("Existing".to_string()))
        );

        wizard.set_name("Fresh");
        assert!(wizard.is_enabled(WizardControl::Next));
        assert_eq!(wizard.next(), Ok(WizardStep::GenieSpace));
        assert_eq!(wizard.skip(), Ok(WizardStep::SlideStyle));

        assert!(!wizard.is_enabled(WizardControl::Next));
        assert!(!wizard.is_enabled(WizardControl::Skip));
        wizard.set_slide_style(Some(2));
        assert_eq!(wizard.next(), Ok(WizardStep::DeckPrompt));
    }

    #[test_case(WizardStep::Name, false ; "name is required")]
    #[test_case(WizardStep::GenieSpace, true ; "genie space is optional")]
    #[test_case(WizardStep::SlideStyle, false ; "style is required")]
    #[test_case(WizardStep::DeckPrompt, true ; "prompt is optional")]
    #[test_case(WizardStep::Review, false ; "review is final")]
    fn test_skip_only_on_optional_steps(step: WizardStep, skippable: bool) {
        assert_eq!(step.is_optional(), skippable);
    }

    #[test]
    fn test_whitespace_name_is_empty() {
        let mut wizard = ProfileWizard::create(Vec::new());
        wizard.set_name("   ");
        assert_eq!(wizard.check(WizardControl::Next), Err(GuardError::EmptyName));
    }

    #[test]
    fn test_skip_clears_optional_value() {
        let mut wizard = ProfileWizard::create(Vec::new());
        wizard.set_name("Genie");
        wizard.next().unwrap();
        wizard.set_genie_space(Some(GenieSpace {
            space_id: "s1".to_string(),
            space_name: "Sales".to_string(),
        }));
        wizard.skip().unwrap();
        assert_eq!(wizard.draft().genie_space, None);
    }

    #[test]
    fn test_rejected_submit_stays_on_review_with_server_text() {
        let mut wizard = at_review("Dup");
        assert!(wizard.is_enabled(WizardControl::Submit));

        wizard.reject("Profile with name 'Dup' already exists");
        assert_eq!(wizard.step(), WizardStep::Review);
        assert_eq!(wizard.server_error(), Some("Profile with name 'Dup' already exists"));

        wizard.accept();
        assert_eq!(wizard.step(), WizardStep::Submitted);
        assert!(!wizard.is_enabled(WizardControl::Next));
    }

    #[test]
    fn test_edit_mode_allows_own_name_and_sends_rename_only_when_changed() {
        let profile = Profile {
            id: 4,
            name: "Mine".to_string(),
            description: None,
            is_default: false,
            slide_style_id: Some(1),
            deck_prompt_id: None,
            genie_space: None,
            created_at: chrono::Utc::now(),
            created_by: "t".to_string(),
            updated_at: chrono::Utc::now(),
            updated_by: "t".to_string(),
        };
        let mut wizard = ProfileWizard::edit(&profile, vec!["Mine".to_string(), "Other".to_string()]);
        assert!(wizard.is_enabled(WizardControl::Next));

        wizard.set_name("Other");
        assert!(!wizard.is_enabled(WizardControl::Next));
        wizard.set_name("Mine");
        wizard.next().unwrap();
        wizard.next().unwrap();
        wizard.next().unwrap();
        wizard.next().unwrap();

        match wizard.submission().unwrap() {
            Submission::Update(id, update) => {
                assert_eq!(id, 4);
                assert_eq!(update.name, None);
                assert!(update.replace_attributes);
            }
            other => panic!("unexpected submission: {other:?}"),
        }
    }

    #[test]
    fn test_settle_conflict_stays_on_review() {
        let mut wizard = at_review("Dup");
        let detail = "Profile with name 'Dup' already exists".to_string();

        let err = wizard
            .settle(Err(E2eError::Conflict {
                name: "Dup".to_string(),
                detail: detail.clone(),
            }))
            .unwrap_err();

        assert!(matches!(err, E2eError::Conflict { .. }));
        assert_eq!(wizard.step(), WizardStep::Review);
        assert_eq!(wizard.server_error(), Some(detail.as_str()));
    }

    #[test]
    fn test_step_attribute_parsing() {
        assert_eq!(WizardStep::from_attr("slide_style"), Some(WizardStep::SlideStyle));
        assert_eq!(WizardStep::from_attr(" review "), Some(WizardStep::Review));
        assert_eq!(WizardStep::from_attr("step-9"), None);
        assert_eq!(WizardStep::DeckPrompt.number(), 4);
    }
}
