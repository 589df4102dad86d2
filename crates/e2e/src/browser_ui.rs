//! `UiSurface` over a real browser page
//!
//! Reads are single `eval` round trips returning plain JSON; writes are
//! clicks and fills followed by a short poll for the page to reflect them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightSession, WaitState};
use crate::selectors::Selectors;
use crate::ui::{
    Badge, ProfileRow, RowAction, SelectorView, UiSurface, WizardField, WizardPick, WizardView,
};
use crate::wizard::{WizardControl, WizardStep};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_SELECTOR: &str = r#"
const label = document.querySelector(arg.label);
const options = [...document.querySelectorAll(arg.option)].map(o => ({
  name: (o.getAttribute(arg.nameAttr) ?? o.textContent).trim(),
  loaded: !!o.querySelector(arg.loaded),
}));
return {
  label: label ? label.textContent.trim() : '',
  default_badge: !!document.querySelector(arg.badge),
  entries: options,
};
"#;

const READ_ROWS: &str = r#"
const visible = el => !!el && el.offsetParent !== null && !el.disabled;
return [...document.querySelectorAll(arg.row)].map(row => {
  const find = sel => row.querySelector(sel);
  const rawId = row.getAttribute(arg.idAttr);
  const nameEl = find(arg.name);
  const descEl = find(arg.description);
  const badges = [];
  if (visible(find(arg.defaultBadge))) badges.push('default');
  if (visible(find(arg.loadedBadge))) badges.push('loaded');
  const actions = [...row.querySelectorAll('[data-testid^="' + arg.actionPrefix + '"]')]
    .filter(visible)
    .map(el => el.getAttribute('data-testid').slice(arg.actionPrefix.length));
  return {
    id: rawId === null || rawId === '' ? null : Number(rawId),
    name: (row.getAttribute(arg.nameAttr) ?? (nameEl ? nameEl.textContent : '')).trim(),
    description: descEl && descEl.textContent.trim() ? descEl.textContent.trim() : null,
    badges,
    actions,
  };
});
"#;

const READ_WIZARD: &str = r#"
const root = document.querySelector(arg.root);
if (!root) return { step: null, error: null };
const error = document.querySelector(arg.error);
return {
  step: root.getAttribute(arg.stepAttr),
  error: error && error.textContent.trim() ? error.textContent.trim() : null,
};
"#;

const READ_ENABLED: &str = r#"
const el = document.querySelector(arg.selector);
return !!el && el.offsetParent !== null && !el.disabled && el.getAttribute('aria-disabled') !== 'true';
"#;

const READ_TEXT: &str = r#"
const el = document.querySelector(arg.selector);
return el && el.offsetParent !== null && el.textContent.trim() ? el.textContent.trim() : null;
"#;

const COUNT: &str = "return document.querySelectorAll(arg.selector).length;";

#[derive(Deserialize)]
struct RawRow {
    id: Option<i64>,
    name: String,
    description: Option<String>,
    badges: Vec<String>,
    actions: Vec<String>,
}

impl RawRow {
    fn into_row(self) -> ProfileRow {
        let badges = self
            .badges
            .iter()
            .filter_map(|b| match b.as_str() {
                "default" => Some(Badge::Default),
                "loaded" => Some(Badge::Loaded),
                _ => None,
            })
            .collect();
        let actions = self
            .actions
            .iter()
            .filter_map(|a| RowAction::ALL.into_iter().find(|known| known.as_str() == a))
            .collect();
        ProfileRow {
            id: self.id,
            name: self.name,
            description: self.description,
            badges,
            actions,
        }
    }
}

#[derive(Deserialize)]
struct RawWizard {
    step: Option<String>,
    error: Option<String>,
}

pub struct PlaywrightSurface {
    page: PlaywrightSession,
    selectors: Selectors,
    profiles_path: String,
}

impl PlaywrightSurface {
    pub fn new(page: PlaywrightSession, selectors: Selectors, profiles_path: impl Into<String>) -> Self {
        Self {
            page,
            selectors,
            profiles_path: profiles_path.into(),
        }
    }

    pub fn page(&self) -> &PlaywrightSession {
        &self.page
    }

    /// Poll `check` until it yields a value or the command timeout passes
    async fn poll<T, F, Fut>(&self, what: &str, mut check: F) -> E2eResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = E2eResult<Option<T>>>,
    {
        let deadline = Instant::now() + self.page.config().command_timeout;
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(E2eError::Timeout(what.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        self.page.eval(COUNT, json!({ "selector": selector })).await
    }

    async fn text(&self, selector: &str) -> E2eResult<Option<String>> {
        self.page.eval(READ_TEXT, json!({ "selector": selector })).await
    }

    async fn read_selector(&self) -> E2eResult<SelectorView> {
        let s = &self.selectors;
        self.page
            .eval(
                READ_SELECTOR,
                json!({
                    "label": s.selector_label,
                    "badge": s.selector_default_badge,
                    "option": s.selector_option,
                    "loaded": s.loaded_indicator,
                    "nameAttr": s.row_name_attribute,
                }),
            )
            .await
    }
}

#[async_trait]
impl UiSurface for PlaywrightSurface {
    async fn open_profiles(&self) -> E2eResult<()> {
        self.page.goto(&self.profiles_path).await?;
        self.page
            .wait_for(&self.selectors.selector_label, WaitState::Visible)
            .await
    }

    async fn selector(&self) -> E2eResult<SelectorView> {
        // Options only render while the dropdown is open
        if self.count(&self.selectors.selector_option).await? > 0 {
            return self.read_selector().await;
        }
        self.page.click(&self.selectors.selector_toggle).await?;
        let view = self.read_selector().await;
        self.page.click(&self.selectors.selector_toggle).await?;
        view
    }

    async fn choose_in_selector(&self, name: &str) -> E2eResult<()> {
        if self.count(&self.selectors.selector_option).await? == 0 {
            self.page.click(&self.selectors.selector_toggle).await?;
        }
        self.page.click(&self.selectors.selector_option_named(name)).await?;

        self.poll(&format!("selector to show '{}'", name), || async move {
            let view = self.read_selector().await?;
            Ok((view.current_name().as_deref() == Some(name)).then_some(()))
        })
        .await
    }

    async fn rows(&self) -> E2eResult<Vec<ProfileRow>> {
        let s = &self.selectors;
        let raw: Vec<RawRow> = self
            .page
            .eval(
                READ_ROWS,
                json!({
                    "row": s.profile_row,
                    "idAttr": s.row_id_attribute,
                    "nameAttr": s.row_name_attribute,
                    "name": s.row_name,
                    "description": s.row_description,
                    "defaultBadge": s.default_badge,
                    "loadedBadge": s.loaded_badge,
                    "actionPrefix": s.row_action_prefix,
                }),
            )
            .await?;
        Ok(raw.into_iter().map(RawRow::into_row).collect())
    }

    async fn row_action(&self, name: &str, action: RowAction) -> E2eResult<()> {
        self.page.click(&self.selectors.row_action(name, action)).await?;

        match action {
            RowAction::Delete => {
                self.page.click(&self.selectors.delete_confirm_button).await?;
                self.page
                    .wait_for(&self.selectors.row_named(name), WaitState::Detached)
                    .await
            }
            RowAction::Duplicate => {
                self.page
                    .wait_for(&self.selectors.dialog_name_input, WaitState::Visible)
                    .await
            }
            RowAction::Edit => {
                self.page
                    .wait_for(&self.selectors.wizard_root, WaitState::Visible)
                    .await
            }
            RowAction::Load => {
                self.poll(&format!("'{}' to load", name), || async move {
                    let view = self.read_selector().await?;
                    Ok((view.current_name().as_deref() == Some(name)).then_some(()))
                })
                .await
            }
            RowAction::SetDefault => {
                let badge = format!("{} {}", self.selectors.row_named(name), self.selectors.default_badge);
                self.page.wait_for(&badge, WaitState::Visible).await
            }
            RowAction::View => Ok(()),
        }
    }

    async fn submit_duplicate_dialog(&self, new_name: &str) -> E2eResult<()> {
        self.page.fill(&self.selectors.dialog_name_input, new_name).await?;
        self.page.click(&self.selectors.dialog_confirm_button).await?;

        // Either the dialog closes or it shows an error
        self.poll("duplicate dialog to settle", || async move {
            if self.count(&self.selectors.dialog_name_input).await? == 0 {
                return Ok(Some(()));
            }
            Ok(self.text(&self.selectors.dialog_error).await?.map(drop))
        })
        .await
    }

    async fn duplicate_dialog_error(&self) -> E2eResult<Option<String>> {
        self.text(&self.selectors.dialog_error).await
    }

    async fn open_wizard(&self) -> E2eResult<()> {
        self.page.click(&self.selectors.new_profile_button).await?;
        self.page
            .wait_for(&self.selectors.wizard_root, WaitState::Visible)
            .await
    }

    async fn wizard(&self) -> E2eResult<WizardView> {
        let s = &self.selectors;
        let raw: RawWizard = self
            .page
            .eval(
                READ_WIZARD,
                json!({
                    "root": s.wizard_root,
                    "error": s.wizard_error,
                    "stepAttr": s.wizard_step_attribute,
                }),
            )
            .await?;

        let step = match raw.step {
            None => None,
            Some(value) => Some(WizardStep::from_attr(&value).ok_or_else(|| {
                E2eError::Playwright(format!("unrecognised wizard step '{}'", value))
            })?),
        };
        Ok(WizardView { step, error: raw.error })
    }

    async fn fill_wizard(&self, field: WizardField, value: &str) -> E2eResult<()> {
        let selector = match field {
            WizardField::Name => &self.selectors.wizard_name_input,
            WizardField::Description => &self.selectors.wizard_description_input,
        };
        self.page.fill(selector, value).await
    }

    async fn pick_in_wizard(&self, pick: &WizardPick) -> E2eResult<()> {
        let s = &self.selectors;
        let selector = match pick {
            WizardPick::GenieSpace(id) => s.option_with_id(&s.genie_space_option, id),
            WizardPick::SlideStyle(id) => s.option_with_id(&s.slide_style_option, &id.to_string()),
            WizardPick::DeckPrompt(id) => s.option_with_id(&s.deck_prompt_option, &id.to_string()),
        };
        self.page.click(&selector).await
    }

    async fn wizard_control_enabled(&self, control: WizardControl) -> E2eResult<bool> {
        self.page
            .eval(
                READ_ENABLED,
                json!({ "selector": self.selectors.wizard_control(control) }),
            )
            .await
    }

    async fn click_wizard(&self, control: WizardControl) -> E2eResult<()> {
        let before = self.wizard().await?;
        let before = &before;
        self.page.click(self.selectors.wizard_control(control)).await?;

        // Wait for the step to move, the wizard to close, or an error banner
        self.poll(&format!("wizard to react to {:?}", control), || async move {
            let now = self.wizard().await?;
            let settled = now.step != before.step || (now.error.is_some() && now.error != before.error);
            Ok(settled.then_some(()))
        })
        .await?;
        debug!("wizard {:?} done", control);
        Ok(())
    }

    async fn screenshot(&self, name: &str) -> E2eResult<Option<PathBuf>> {
        self.page.screenshot(name).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_row_conversion_drops_unknown_entries() {
        let raw: RawRow = serde_json::from_value(json!({
            "id": 5,
            "name": "Sales",
            "description": null,
            "badges": ["default", "sparkle"],
            "actions": ["load", "set-default", "export"],
        }))
        .unwrap();

        let row = raw.into_row();
        assert_eq!(row.id, Some(5));
        assert_eq!(row.badges, vec![Badge::Default]);
        assert_eq!(row.actions, vec![RowAction::Load, RowAction::SetDefault]);
    }
}
