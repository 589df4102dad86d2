//! UI surface port
//!
//! The narrow set of page interactions the driver and the UI state reader
//! need. `browser_ui::PlaywrightSurface` implements it against a real browser;
//! `stub::ui::SimulatedUi` implements it in memory for self-tests.

use async_trait::async_trait;
use profile_e2e_common::ProfileId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::E2eResult;
use crate::selectors::parse_selector_label;
use crate::wizard::{WizardControl, WizardStep};

/// Per-row actions of the profile list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    View,
    Load,
    SetDefault,
    Duplicate,
    Edit,
    Delete,
}

impl RowAction {
    pub const ALL: [RowAction; 6] = [
        RowAction::View,
        RowAction::Load,
        RowAction::SetDefault,
        RowAction::Duplicate,
        RowAction::Edit,
        RowAction::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::View => "view",
            RowAction::Load => "load",
            RowAction::SetDefault => "set-default",
            RowAction::Duplicate => "duplicate",
            RowAction::Edit => "edit",
            RowAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Default,
    Loaded,
}

/// Rendered state of the profile selector control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorView {
    /// Label text, e.g. `Profile: Sales`
    pub label: String,
    /// Whether the default badge is shown next to the label
    pub default_badge: bool,
    pub entries: Vec<SelectorEntry>,
}

impl SelectorView {
    /// Profile name the label announces
    pub fn current_name(&self) -> Option<String> {
        parse_selector_label(&self.label)
    }

    /// Names carrying the loaded indicator in the dropdown
    pub fn loaded_entries(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.loaded)
            .map(|e| e.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub name: String,
    pub loaded: bool,
}

/// One rendered row of the profile list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    /// Taken from the row's id attribute when the page renders one
    pub id: Option<ProfileId>,
    pub name: String,
    pub description: Option<String>,
    pub badges: Vec<Badge>,
    pub actions: Vec<RowAction>,
}

impl ProfileRow {
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.contains(&badge)
    }

    pub fn offers(&self, action: RowAction) -> bool {
        self.actions.contains(&action)
    }
}

/// Rendered state of the wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardView {
    /// None once the wizard has closed
    pub step: Option<WizardStep>,
    /// Error banner text, shown verbatim
    pub error: Option<String>,
}

/// Pickers of the optional and required wizard steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardPick {
    GenieSpace(String),
    SlideStyle(i64),
    DeckPrompt(i64),
}

/// Free-text wizard inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardField {
    Name,
    Description,
}

#[async_trait]
pub trait UiSurface: Send + Sync {
    /// Navigate to (or reload) the profile list page
    async fn open_profiles(&self) -> E2eResult<()>;

    async fn selector(&self) -> E2eResult<SelectorView>;

    /// Load a profile through the selector dropdown
    async fn choose_in_selector(&self, name: &str) -> E2eResult<()>;

    async fn rows(&self) -> E2eResult<Vec<ProfileRow>>;

    /// Click a row action; Delete is confirmed in the follow-up prompt
    async fn row_action(&self, name: &str, action: RowAction) -> E2eResult<()>;

    /// Type into the duplicate dialog's name input and confirm
    async fn submit_duplicate_dialog(&self, new_name: &str) -> E2eResult<()>;

    /// Error text of the duplicate dialog, None once it closed cleanly
    async fn duplicate_dialog_error(&self) -> E2eResult<Option<String>>;

    /// Open the wizard for a new profile
    async fn open_wizard(&self) -> E2eResult<()>;

    async fn wizard(&self) -> E2eResult<WizardView>;

    async fn fill_wizard(&self, field: WizardField, value: &str) -> E2eResult<()>;

    async fn pick_in_wizard(&self, pick: &WizardPick) -> E2eResult<()>;

    async fn wizard_control_enabled(&self, control: WizardControl) -> E2eResult<bool>;

    async fn click_wizard(&self, control: WizardControl) -> E2eResult<()>;

    /// Capture the page for diagnosis; surfaces without pixels return None
    async fn screenshot(&self, _name: &str) -> E2eResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Find a row by name
pub fn row_named<'a>(rows: &'a [ProfileRow], name: &str) -> Option<&'a ProfileRow> {
    rows.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_view_reports_current_and_loaded() {
        let view = SelectorView {
            label: "Profile: B".to_string(),
            default_badge: false,
            entries: vec![
                SelectorEntry { name: "A".to_string(), loaded: false },
                SelectorEntry { name: "B".to_string(), loaded: true },
            ],
        };
        assert_eq!(view.current_name().as_deref(), Some("B"));
        assert_eq!(view.loaded_entries(), vec!["B"]);
    }

    #[test]
    fn test_row_action_names_are_kebab_case() {
        assert_eq!(RowAction::SetDefault.as_str(), "set-default");
        assert_eq!(RowAction::ALL.len(), 6);
    }
}
