//! Entity fixture provisioner
//!
//! Creates and deletes profiles straight through the control API, bypassing
//! the UI, so setup and teardown stay fast and independent of the page.

use profile_e2e_common::{NewProfile, Profile, ProfileAttributes, ProfileId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::ProfileApi;
use crate::error::{E2eError, E2eResult};
use crate::fixture::{fixture_name, FixtureHandle, ReleaseOutcome};

#[derive(Clone)]
pub struct Provisioner {
    api: Arc<dyn ProfileApi>,
}

/// One profile considered by a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    pub id: ProfileId,
    pub name: String,
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOutcome {
    Deleted,
    WouldDelete,
    /// Default or loaded profiles are left alone
    Kept(String),
    Failed(String),
}

impl Provisioner {
    pub fn new(api: Arc<dyn ProfileApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn ProfileApi> {
        &self.api
    }

    /// Create a profile; `Conflict` when `name` exists
    pub async fn create(&self, name: &str, attributes: Option<&ProfileAttributes>) -> E2eResult<ProfileId> {
        let request = NewProfile {
            name: name.to_string(),
            attributes: attributes.cloned().unwrap_or_default(),
        };
        let profile = self.api.create_profile(&request).await?;
        debug!("Provisioned profile {} ({})", profile.id, profile.name);
        Ok(profile.id)
    }

    /// Delete a profile; `NotFound` when already absent
    pub async fn delete(&self, id: ProfileId) -> E2eResult<()> {
        self.api.delete_profile(id).await
    }

    /// Most recent state of the profile called `name`
    pub async fn get_by_name(&self, name: &str) -> E2eResult<Option<Profile>> {
        self.api.find_by_name(name).await
    }

    /// Create a fixture with a name unique to this invocation
    pub async fn provision(
        &self,
        operation: &str,
        attributes: Option<&ProfileAttributes>,
    ) -> E2eResult<FixtureHandle> {
        let name = fixture_name(operation);
        let id = self.create(&name, attributes).await.map_err(|e| match e {
            E2eError::Conflict { detail, .. } => {
                E2eError::FixtureSetup(format!("fixture name collided: {}", detail))
            }
            other => other,
        })?;

        Ok(FixtureHandle {
            id,
            name,
            operation: operation.to_string(),
        })
    }

    /// Delete a fixture, treating an already-absent profile as success
    pub async fn release(&self, id: ProfileId) -> E2eResult<ReleaseOutcome> {
        match self.delete(id).await {
            Ok(()) => Ok(ReleaseOutcome::Deleted),
            Err(e) if e.is_not_found() => {
                debug!("Fixture {} already gone", id);
                Ok(ReleaseOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete leaked fixtures whose names start with `prefix`
    pub async fn sweep(&self, prefix: &str, dry_run: bool) -> E2eResult<Vec<SweepEntry>> {
        let current = self.api.current_profile().await?.id;
        let mut entries = Vec::new();

        for profile in self.api.list_profiles().await? {
            if !profile.name.starts_with(prefix) {
                continue;
            }

            let outcome = if profile.is_default {
                SweepOutcome::Kept("default profile".to_string())
            } else if profile.id == current {
                SweepOutcome::Kept("currently loaded".to_string())
            } else if dry_run {
                SweepOutcome::WouldDelete
            } else {
                match self.release(profile.id).await {
                    Ok(_) => SweepOutcome::Deleted,
                    Err(e) => {
                        warn!("Failed to sweep {} ({}): {}", profile.id, profile.name, e);
                        SweepOutcome::Failed(e.to_string())
                    }
                }
            };

            entries.push(SweepEntry {
                id: profile.id,
                name: profile.name,
                outcome,
            });
        }

        info!("Sweep considered {} fixture(s)", entries.len());
        Ok(entries)
    }
}
