//! Element locators for the profile UI
//!
//! Every locator is keyed on `data-testid` by default and can be overridden
//! from the `[ui.selectors]` table of the harness configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::ui::RowAction;
use crate::wizard::WizardControl;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    // Profile selector
    pub selector_label: String,
    pub selector_toggle: String,
    pub selector_default_badge: String,
    pub selector_option: String,
    pub loaded_indicator: String,

    // Profile list
    pub profile_row: String,
    pub row_id_attribute: String,
    pub row_name_attribute: String,
    pub row_name: String,
    pub row_description: String,
    pub default_badge: String,
    pub loaded_badge: String,
    pub row_action_prefix: String,
    pub delete_confirm_button: String,

    // Duplicate dialog
    pub dialog_name_input: String,
    pub dialog_confirm_button: String,
    pub dialog_error: String,

    // Wizard
    pub new_profile_button: String,
    pub wizard_root: String,
    pub wizard_step_attribute: String,
    pub wizard_name_input: String,
    pub wizard_description_input: String,
    pub genie_space_option: String,
    pub slide_style_option: String,
    pub deck_prompt_option: String,
    pub option_id_attribute: String,
    pub next_button: String,
    pub skip_button: String,
    pub submit_button: String,
    pub wizard_error: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            selector_label: testid("profile-selector-label"),
            selector_toggle: testid("profile-selector"),
            selector_default_badge: testid("profile-selector-default-badge"),
            selector_option: testid("profile-selector-option"),
            loaded_indicator: testid("loaded-indicator"),

            profile_row: testid("profile-row"),
            row_id_attribute: "data-profile-id".to_string(),
            row_name_attribute: "data-profile-name".to_string(),
            row_name: testid("profile-name"),
            row_description: testid("profile-description"),
            default_badge: testid("badge-default"),
            loaded_badge: testid("badge-loaded"),
            row_action_prefix: "profile-action-".to_string(),
            delete_confirm_button: testid("confirm-delete"),

            dialog_name_input: testid("duplicate-name-input"),
            dialog_confirm_button: testid("duplicate-confirm"),
            dialog_error: testid("duplicate-error"),

            new_profile_button: testid("new-profile"),
            wizard_root: testid("profile-wizard"),
            wizard_step_attribute: "data-step".to_string(),
            wizard_name_input: testid("wizard-name"),
            wizard_description_input: testid("wizard-description"),
            genie_space_option: testid("genie-space-option"),
            slide_style_option: testid("slide-style-option"),
            deck_prompt_option: testid("deck-prompt-option"),
            option_id_attribute: "data-option-id".to_string(),
            next_button: testid("wizard-next"),
            skip_button: testid("wizard-skip"),
            submit_button: testid("wizard-submit"),
            wizard_error: testid("wizard-error"),
        }
    }
}

fn testid(id: &str) -> String {
    format!(r#"[data-testid="{}"]"#, id)
}

impl Selectors {
    /// Row whose name attribute equals `name`
    pub fn row_named(&self, name: &str) -> String {
        format!(
            r#"{}[{}="{}"]"#,
            self.profile_row,
            self.row_name_attribute,
            css_escape(name)
        )
    }

    /// Action button inside the row named `name`
    pub fn row_action(&self, name: &str, action: RowAction) -> String {
        format!(
            r#"{} [data-testid="{}{}"]"#,
            self.row_named(name),
            self.row_action_prefix,
            action.as_str()
        )
    }

    /// Dropdown entry of the profile selector for `name`
    pub fn selector_option_named(&self, name: &str) -> String {
        format!(r#"{}[{}="{}"]"#, self.selector_option, self.row_name_attribute, css_escape(name))
    }

    /// Option inside one of the wizard pickers
    pub fn option_with_id(&self, picker: &str, id: &str) -> String {
        format!(r#"{}[{}="{}"]"#, picker, self.option_id_attribute, css_escape(id))
    }

    pub fn wizard_control(&self, control: WizardControl) -> &str {
        match control {
            WizardControl::Next => &self.next_button,
            WizardControl::Skip => &self.skip_button,
            WizardControl::Submit => &self.submit_button,
        }
    }
}

/// Escape a value for use inside a double-quoted CSS attribute selector
pub fn css_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extract the profile name from a selector label such as `Profile: Sales`
pub fn parse_selector_label(label: &str) -> Option<String> {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    let re = LABEL.get_or_init(|| Regex::new(r"^\s*Profile:\s*(.+?)\s*$").expect("static regex"));
    re.captures(label).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Profile: Sales", Some("Sales") ; "plain")]
    #[test_case("  Profile:   E2E Test Load 1706600000000 ", Some("E2E Test Load 1706600000000") ; "padded")]
    #[test_case("Profiles", None ; "unrelated text")]
    fn test_parse_selector_label(label: &str, expected: Option<&str>) {
        assert_eq!(parse_selector_label(label).as_deref(), expected);
    }

    #[test]
    fn test_row_action_selector_escapes_quotes() {
        let selectors = Selectors::default();
        let sel = selectors.row_action(r#"Say "hi""#, RowAction::Delete);
        assert_eq!(
            sel,
            r#"[data-testid="profile-row"][data-profile-name="Say \"hi\""] [data-testid="profile-action-delete"]"#
        );
    }
}
