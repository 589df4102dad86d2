//! Dual-channel state verifier
//!
//! Every expectation is checked against both the control API and the
//! rendered UI. The channels are compared with each other first: if they
//! disagree the result is an `Inconsistency` naming both values, even when
//! one of them happens to match the expectation. Only when they agree is the
//! shared value compared with what the case expected.

use async_trait::async_trait;
use profile_e2e_common::{Profile, ProfileId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::ProfileApi;
use crate::driver::SessionContext;
use crate::error::{Channel, E2eError, E2eResult};
use crate::ui::{Badge, UiSurface};

/// Observable profile attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    Description,
    IsDefault,
    IsLoaded,
    SlideStyle,
    DeckPrompt,
    GenieSpace,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::Description => "description",
            Attribute::IsDefault => "is_default",
            Attribute::IsLoaded => "is_loaded",
            Attribute::SlideStyle => "slide_style_id",
            Attribute::DeckPrompt => "deck_prompt_id",
            Attribute::GenieSpace => "genie_space",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type AttributeSet = BTreeMap<Attribute, Value>;

/// Expected attribute values for one profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expected(AttributeSet);

impl Expected {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: Attribute, value: impl Into<Value>) -> Self {
        self.0.insert(attribute, value.into());
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.with(Attribute::Name, name)
    }

    pub fn description(self, description: Option<&str>) -> Self {
        self.with(Attribute::Description, json!(description))
    }

    pub fn is_default(self, is_default: bool) -> Self {
        self.with(Attribute::IsDefault, is_default)
    }

    pub fn is_loaded(self, is_loaded: bool) -> Self {
        self.with(Attribute::IsLoaded, is_loaded)
    }

    pub fn slide_style(self, slide_style_id: Option<i64>) -> Self {
        self.with(Attribute::SlideStyle, json!(slide_style_id))
    }

    /// Every persisted attribute of `profile`
    pub fn of_profile(profile: &Profile) -> Self {
        Self::new()
            .name(&profile.name)
            .description(profile.description.as_deref())
            .is_default(profile.is_default)
            .slide_style(profile.slide_style_id)
            .with(Attribute::DeckPrompt, json!(profile.deck_prompt_id))
            .with(Attribute::GenieSpace, json!(profile.genie_space))
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.0
    }
}

/// Read-only view of profile state through one channel
#[async_trait]
pub trait StateObserver: Send + Sync {
    fn channel(&self) -> Channel;

    /// Attributes this channel can see at all
    fn observable(&self) -> &'static [Attribute];

    /// Observed attributes of `id`; `NotFound` when the channel has no such profile
    async fn observe(&self, id: ProfileId) -> E2eResult<AttributeSet>;

    /// Names of every profile this channel marks as default
    async fn defaults(&self) -> E2eResult<Vec<String>>;

    /// Names of every profile this channel marks as loaded
    async fn loaded(&self) -> E2eResult<Vec<String>>;
}

/// Observer over the control API
pub struct ApiStateReader {
    api: Arc<dyn ProfileApi>,
}

impl ApiStateReader {
    pub fn new(api: Arc<dyn ProfileApi>) -> Self {
        Self { api }
    }
}

const API_ATTRIBUTES: &[Attribute] = &[
    Attribute::Name,
    Attribute::Description,
    Attribute::IsDefault,
    Attribute::IsLoaded,
    Attribute::SlideStyle,
    Attribute::DeckPrompt,
    Attribute::GenieSpace,
];

#[async_trait]
impl StateObserver for ApiStateReader {
    fn channel(&self) -> Channel {
        Channel::Api
    }

    fn observable(&self) -> &'static [Attribute] {
        API_ATTRIBUTES
    }

    async fn observe(&self, id: ProfileId) -> E2eResult<AttributeSet> {
        let profile = self.api.get_profile(id).await?;
        let current = self.api.current_profile().await?;

        let mut set = Expected::of_profile(&profile).0;
        set.insert(Attribute::IsLoaded, Value::Bool(current.id == id));
        Ok(set)
    }

    async fn defaults(&self) -> E2eResult<Vec<String>> {
        Ok(self
            .api
            .list_profiles()
            .await?
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.name)
            .collect())
    }

    async fn loaded(&self) -> E2eResult<Vec<String>> {
        Ok(vec![self.api.current_profile().await?.name])
    }
}

/// Observer over the rendered page
pub struct UiStateReader {
    ui: Arc<dyn UiSurface>,
}

impl UiStateReader {
    pub fn new(ui: Arc<dyn UiSurface>) -> Self {
        Self { ui }
    }
}

const UI_ATTRIBUTES: &[Attribute] = &[
    Attribute::Name,
    Attribute::Description,
    Attribute::IsDefault,
    Attribute::IsLoaded,
];

#[async_trait]
impl StateObserver for UiStateReader {
    fn channel(&self) -> Channel {
        Channel::Ui
    }

    fn observable(&self) -> &'static [Attribute] {
        UI_ATTRIBUTES
    }

    async fn observe(&self, id: ProfileId) -> E2eResult<AttributeSet> {
        self.ui.open_profiles().await?;
        let rows = self.ui.rows().await?;
        let row = rows
            .into_iter()
            .find(|r| r.id == Some(id))
            .ok_or_else(|| E2eError::not_found("profile", id, Channel::Ui))?;
        let selector = self.ui.selector().await?;

        let description = row.description.clone().filter(|d| !d.trim().is_empty());
        let mut set = AttributeSet::new();
        set.insert(Attribute::Name, Value::String(row.name.clone()));
        set.insert(Attribute::Description, json!(description));
        set.insert(Attribute::IsDefault, Value::Bool(row.has_badge(Badge::Default)));
        set.insert(
            Attribute::IsLoaded,
            Value::Bool(selector.current_name().as_deref() == Some(row.name.as_str())),
        );
        Ok(set)
    }

    async fn defaults(&self) -> E2eResult<Vec<String>> {
        self.ui.open_profiles().await?;
        Ok(self
            .ui
            .rows()
            .await?
            .into_iter()
            .filter(|r| r.has_badge(Badge::Default))
            .map(|r| r.name)
            .collect())
    }

    async fn loaded(&self) -> E2eResult<Vec<String>> {
        let selector = self.ui.selector().await?;
        Ok(selector.loaded_entries().into_iter().map(str::to_string).collect())
    }
}

/// How long the verifier waits for agreeing channels to reach the expected value
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(250),
        }
    }
}

impl SettlePolicy {
    /// A single observation, no waiting
    pub fn immediate() -> Self {
        Self {
            attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
pub struct StateVerifier {
    api: Arc<dyn StateObserver>,
    ui: Arc<dyn StateObserver>,
    settle: SettlePolicy,
}

impl StateVerifier {
    pub fn new(api: Arc<dyn StateObserver>, ui: Arc<dyn StateObserver>) -> Self {
        Self {
            api,
            ui,
            settle: SettlePolicy::default(),
        }
    }

    /// Verifier over the stock API and UI readers
    pub fn from_ports(api: Arc<dyn ProfileApi>, ui: Arc<dyn UiSurface>) -> Self {
        Self::new(
            Arc::new(ApiStateReader::new(api)),
            Arc::new(UiStateReader::new(ui)),
        )
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Repeat `check` until it passes or the settle policy runs out;
    /// inconsistencies and infrastructure errors are returned at once
    async fn settled<F, Fut>(&self, what: &str, check: F) -> E2eResult<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = E2eResult<()>>,
    {
        let attempts = self.settle.attempts.max(1);
        let mut attempt = 1;
        loop {
            match check().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    debug!("{} not settled (attempt {}/{}): {}", what, attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(self.settle.interval).await;
                }
                Err(e) => {
                    warn!("{} failed: {}", what, e);
                    return Err(e);
                }
            }
        }
    }

    /// Confirm `expected` through both channels
    pub async fn verify(&self, id: ProfileId, expected: &Expected) -> E2eResult<()> {
        self.settled("verify", || self.verify_once(id, expected)).await
    }

    async fn verify_once(&self, id: ProfileId, expected: &Expected) -> E2eResult<()> {
        let api = self.api.observe(id).await;
        let ui = self.ui.observe(id).await;

        let (api, ui) = match (api, ui) {
            (Ok(api), Ok(ui)) => (api, ui),
            (Err(e), Ok(_)) if e.is_not_found() => return Err(existence_mismatch(id, false, true)),
            (Ok(_), Err(e)) if e.is_not_found() => return Err(existence_mismatch(id, true, false)),
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        for (attribute, want) in expected.attributes() {
            let seen_api = api.get(attribute).filter(|_| self.api.observable().contains(attribute));
            let seen_ui = ui.get(attribute).filter(|_| self.ui.observable().contains(attribute));

            let agreed = match (seen_api, seen_ui) {
                (Some(a), Some(u)) if a != u => {
                    return Err(E2eError::Inconsistency {
                        profile_id: id,
                        attribute: attribute.to_string(),
                        ui: u.to_string(),
                        api: a.to_string(),
                    });
                }
                (Some(a), _) => a,
                (None, Some(u)) => u,
                (None, None) => {
                    return Err(E2eError::AssertionFailed(format!(
                        "{} of profile {} is not observable through either channel",
                        attribute, id
                    )));
                }
            };

            if agreed != want {
                return Err(E2eError::AssertionFailed(format!(
                    "{} of profile {} is {}, expected {}",
                    attribute, id, agreed, want
                )));
            }
        }
        Ok(())
    }

    /// Both channels must report `id` as gone
    pub async fn verify_absent(&self, id: ProfileId) -> E2eResult<()> {
        self.settled("verify_absent", || self.verify_absent_once(id)).await
    }

    async fn verify_absent_once(&self, id: ProfileId) -> E2eResult<()> {
        let api_present = present(self.api.observe(id).await)?;
        let ui_present = present(self.ui.observe(id).await)?;

        match (api_present, ui_present) {
            (false, false) => Ok(()),
            (true, true) => Err(E2eError::AssertionFailed(format!(
                "profile {} still exists",
                id
            ))),
            (api, ui) => Err(existence_mismatch(id, api, ui)),
        }
    }

    /// Exactly one default, and it is `name`, in both channels
    pub async fn verify_single_default(&self, name: &str) -> E2eResult<()> {
        self.settled("verify_single_default", || async move {
            let api = self.api.defaults().await?;
            let ui = self.ui.defaults().await?;
            check_exactly(name, "default", &api, &ui)
        })
        .await
    }

    /// `id` is the loaded profile in both channels, and in the session
    pub async fn verify_loaded(&self, session: &SessionContext, id: ProfileId, name: &str) -> E2eResult<()> {
        if session.current_profile != Some(id) {
            return Err(E2eError::AssertionFailed(format!(
                "session believes {:?} is loaded, expected {}",
                session.current_profile, id
            )));
        }

        self.verify(id, &Expected::new().name(name).is_loaded(true)).await?;
        self.settled("verify_loaded", || async move {
            let api = self.api.loaded().await?;
            let ui = self.ui.loaded().await?;
            check_exactly(name, "loaded", &api, &ui)
        })
        .await
    }
}

/// Channels that agree on a not-yet-expected value may still be settling.
/// A disagreement between them is a real defect and is reported at once.
fn is_retryable(e: &E2eError) -> bool {
    matches!(e, E2eError::AssertionFailed(_))
}

fn present(observed: E2eResult<AttributeSet>) -> E2eResult<bool> {
    match observed {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn existence_mismatch(id: ProfileId, api: bool, ui: bool) -> E2eError {
    let label = |present: bool| if present { "present" } else { "absent" }.to_string();
    E2eError::Inconsistency {
        profile_id: id,
        attribute: "existence".to_string(),
        ui: label(ui),
        api: label(api),
    }
}

/// `api` and `ui` must both be exactly `[name]`
fn check_exactly(name: &str, marker: &str, api: &[String], ui: &[String]) -> E2eResult<()> {
    let mut api_sorted = api.to_vec();
    let mut ui_sorted = ui.to_vec();
    api_sorted.sort();
    ui_sorted.sort();

    if api_sorted != ui_sorted {
        return Err(E2eError::MarkerMismatch {
            marker: marker.to_string(),
            ui: ui_sorted,
            api: api_sorted,
        });
    }
    if api_sorted != [name] {
        return Err(E2eError::AssertionFailed(format!(
            "{} profiles are {:?}, expected exactly [{:?}]",
            marker, api_sorted, name
        )));
    }
    Ok(())
}
