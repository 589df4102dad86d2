//! Test lifecycle coordinator
//!
//! Runs one case as provision -> act -> verify -> cleanup. Cleanup is driven
//! from a registry of actions recorded while the case runs and is replayed in
//! reverse order after success, error and panic alike. Its failures are
//! recorded on the report but never change the verdict.

use async_trait::async_trait;
use futures::FutureExt;
use profile_e2e_common::{Profile, ProfileAttributes, ProfileId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::driver::{SessionContext, UiDriver};
use crate::error::{Channel, E2eError, E2eResult};
use crate::fixture::{FixtureHandle, ReleaseOutcome};
use crate::provisioner::Provisioner;
use crate::verifier::StateVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provision,
    Act,
    Verify,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Fixture setup failed; the operation under test never ran
    Aborted,
    Skipped,
}

/// Deferred restoration of state a case touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "profile_id", rename_all = "snake_case")]
pub enum CleanupAction {
    DeleteProfile(ProfileId),
    RestoreDefault(ProfileId),
    RestoreLoaded(ProfileId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRecord {
    pub action: CleanupAction,
    pub ok: bool,
    pub detail: Option<String>,
}

/// Failure screenshot written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn from_file(path: PathBuf) -> E2eResult<Self> {
        let bytes = std::fs::read(&path)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self {
            path,
            sha256: hex::encode(digest),
            size_bytes: bytes.len() as u64,
        })
    }
}

/// Outcome of one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub operation: String,
    pub status: CaseStatus,
    /// Phase the case was in when it stopped
    pub phase: Phase,
    pub error: Option<String>,
    /// The failure was a UI/API divergence
    pub inconsistency: bool,
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
    pub fixtures: Vec<FixtureHandle>,
    pub cleanup: Vec<CleanupRecord>,
    pub screenshot: Option<Artifact>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        matches!(self.status, CaseStatus::Passed | CaseStatus::Skipped)
    }

    /// Cleanup steps that did not complete
    pub fn cleanup_failures(&self) -> usize {
        self.cleanup.iter().filter(|r| !r.ok).count()
    }
}

/// A single end-to-end case
#[async_trait]
pub trait ProfileCase: Send + Sync {
    fn name(&self) -> &str;

    /// Label used in fixture names
    fn operation(&self) -> &str;

    async fn run(&self, cx: &mut CaseContext) -> E2eResult<()>;
}

/// Everything a running case may use, plus its cleanup registry
pub struct CaseContext {
    pub provisioner: Provisioner,
    pub driver: UiDriver,
    pub verifier: StateVerifier,
    pub session: SessionContext,
    operation: String,
    phase: Phase,
    fixtures: Vec<FixtureHandle>,
    cleanup: Vec<CleanupAction>,
    skip_reason: Option<String>,
    torn_down: bool,
}

impl CaseContext {
    pub fn new(
        provisioner: Provisioner,
        driver: UiDriver,
        verifier: StateVerifier,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            driver,
            verifier,
            session: SessionContext::default(),
            operation: operation.into(),
            phase: Phase::Provision,
            fixtures: Vec::new(),
            cleanup: Vec::new(),
            skip_reason: None,
            torn_down: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enter(&mut self, phase: Phase) {
        info!("[{}] {:?} -> {:?}", self.operation, self.phase, phase);
        self.phase = phase;
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn pending_cleanup(&self) -> &[CleanupAction] {
        &self.cleanup
    }

    /// Provision a uniquely named fixture and schedule its deletion
    pub async fn fixture(&mut self, attributes: Option<&ProfileAttributes>) -> E2eResult<FixtureHandle> {
        let operation = self.operation.clone();
        self.fixture_for(&operation, attributes).await
    }

    /// Like `fixture`, with a custom operation label
    pub async fn fixture_for(
        &mut self,
        operation: &str,
        attributes: Option<&ProfileAttributes>,
    ) -> E2eResult<FixtureHandle> {
        let handle = self.provisioner.provision(operation, attributes).await?;
        self.defer(CleanupAction::DeleteProfile(handle.id));
        self.fixtures.push(handle.clone());
        Ok(handle)
    }

    /// Schedule deletion of a profile the operation under test created
    pub async fn adopt(&mut self, name: &str) -> E2eResult<Profile> {
        let profile = self
            .provisioner
            .get_by_name(name)
            .await?
            .ok_or_else(|| E2eError::not_found("profile", name, Channel::Api))?;
        self.defer(CleanupAction::DeleteProfile(profile.id));
        Ok(profile)
    }

    /// Remember the current default so it is reinstated afterwards
    pub async fn preserve_default(&mut self) -> E2eResult<Profile> {
        let profile = self
            .provisioner
            .api()
            .list_profiles()
            .await?
            .into_iter()
            .find(|p| p.is_default)
            .ok_or_else(|| E2eError::AssertionFailed("no default profile".to_string()))?;
        self.defer(CleanupAction::RestoreDefault(profile.id));
        Ok(profile)
    }

    /// Remember the loaded profile so it is reloaded afterwards
    pub async fn preserve_loaded(&mut self) -> E2eResult<Profile> {
        let profile = self.provisioner.api().current_profile().await?;
        self.session.current_profile = Some(profile.id);
        self.defer(CleanupAction::RestoreLoaded(profile.id));
        Ok(profile)
    }

    pub fn defer(&mut self, action: CleanupAction) {
        debug!("[{}] cleanup registered: {:?}", self.operation, action);
        self.cleanup.push(action);
    }

    /// Mark the case as not applicable to the current backend state
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_reason = Some(reason.into());
    }

    /// Replay the cleanup registry in reverse
    pub async fn teardown(&mut self) -> Vec<CleanupRecord> {
        self.enter(Phase::Cleanup);
        self.torn_down = true;

        let mut records = Vec::with_capacity(self.cleanup.len());
        while let Some(action) = self.cleanup.pop() {
            let result = apply_cleanup(&self.provisioner, &action).await;
            records.push(match result {
                Ok(detail) => CleanupRecord {
                    action,
                    ok: true,
                    detail,
                },
                Err(e) => {
                    warn!("[{}] cleanup {:?} failed: {}", self.operation, action, e);
                    CleanupRecord {
                        action,
                        ok: false,
                        detail: Some(e.to_string()),
                    }
                }
            });
        }
        records
    }
}

/// Dropped before teardown (e.g. the surrounding future was cancelled):
/// hand the remaining actions to the runtime
impl Drop for CaseContext {
    fn drop(&mut self) {
        if self.torn_down || self.cleanup.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "[{}] dropped outside a runtime, {} cleanup action(s) leaked",
                self.operation,
                self.cleanup.len()
            );
            return;
        };

        let provisioner = self.provisioner.clone();
        let mut actions = std::mem::take(&mut self.cleanup);
        let operation = self.operation.clone();
        warn!("[{}] dropped before cleanup, finishing in background", operation);
        handle.spawn(async move {
            while let Some(action) = actions.pop() {
                if let Err(e) = apply_cleanup(&provisioner, &action).await {
                    warn!("[{}] background cleanup {:?} failed: {}", operation, action, e);
                }
            }
        });
    }
}

async fn apply_cleanup(provisioner: &Provisioner, action: &CleanupAction) -> E2eResult<Option<String>> {
    let tolerate_gone = |e: E2eError| {
        if e.is_not_found() {
            Ok(Some("profile no longer exists".to_string()))
        } else {
            Err(e)
        }
    };

    match *action {
        CleanupAction::DeleteProfile(id) => match provisioner.release(id).await? {
            ReleaseOutcome::Deleted => Ok(None),
            ReleaseOutcome::AlreadyGone => Ok(Some("already deleted".to_string())),
        },
        CleanupAction::RestoreDefault(id) => match provisioner.api().set_default(id).await {
            Ok(_) => Ok(None),
            Err(e) => tolerate_gone(e),
        },
        CleanupAction::RestoreLoaded(id) => match provisioner.api().load_profile(id).await {
            Ok(_) => Ok(None),
            Err(e) => tolerate_gone(e),
        },
    }
}

/// Runs cases against one provisioner, driver and verifier
#[derive(Clone)]
pub struct Coordinator {
    provisioner: Provisioner,
    driver: UiDriver,
    verifier: StateVerifier,
    screenshot_on_failure: bool,
}

impl Coordinator {
    pub fn new(provisioner: Provisioner, driver: UiDriver, verifier: StateVerifier) -> Self {
        Self {
            provisioner,
            driver,
            verifier,
            screenshot_on_failure: true,
        }
    }

    pub fn screenshot_on_failure(mut self, enabled: bool) -> Self {
        self.screenshot_on_failure = enabled;
        self
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn context(&self, operation: &str) -> CaseContext {
        CaseContext::new(
            self.provisioner.clone(),
            self.driver.clone(),
            self.verifier.clone(),
            operation,
        )
    }

    pub async fn run_case(&self, case: &dyn ProfileCase) -> CaseReport {
        let start = Instant::now();
        let mut cx = self.context(case.operation());
        info!("Running case: {}", case.name());

        let outcome = AssertUnwindSafe(case.run(&mut cx)).catch_unwind().await;
        let phase = cx.phase();

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(E2eError::Panicked(panic_message(payload.as_ref()))),
        };

        let (status, err) = match result {
            Ok(()) if cx.skip_reason.is_some() => (CaseStatus::Skipped, None),
            Ok(()) => (CaseStatus::Passed, None),
            Err(e) if phase == Phase::Provision => (CaseStatus::Aborted, Some(e)),
            Err(e) => (CaseStatus::Failed, Some(e)),
        };

        let screenshot = match (&err, self.screenshot_on_failure) {
            (Some(_), true) => self.capture(case.name()).await,
            _ => None,
        };

        let cleanup = cx.teardown().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match (&status, &err) {
            (_, Some(e)) => error!("✗ {} [{:?}] {}", case.name(), phase, e),
            (CaseStatus::Skipped, None) => info!(
                "- {} skipped: {}",
                case.name(),
                cx.skip_reason.as_deref().unwrap_or_default()
            ),
            _ => info!("✓ {} ({} ms)", case.name(), duration_ms),
        }

        CaseReport {
            name: case.name().to_string(),
            operation: case.operation().to_string(),
            status,
            phase,
            inconsistency: err.as_ref().map(E2eError::is_inconsistency).unwrap_or(false),
            error: err.map(|e| e.to_string()),
            skip_reason: cx.skip_reason.clone(),
            duration_ms,
            fixtures: cx.fixtures().to_vec(),
            cleanup,
            screenshot,
        }
    }

    async fn capture(&self, case_name: &str) -> Option<Artifact> {
        let slug: String = case_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();

        match self.driver.ui().screenshot(&slug).await {
            Ok(Some(path)) => match Artifact::from_file(path) {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    warn!("Failed to digest screenshot for {}: {}", case_name, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to capture screenshot for {}: {}", case_name, e);
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
