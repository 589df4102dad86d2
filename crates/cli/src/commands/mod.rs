//! Subcommands

pub mod list;
pub mod profiles;
pub mod run;
pub mod status;
pub mod sweep;

use std::sync::Arc;

use anyhow::Result;
use profile_e2e::config::ApiConfig;
use profile_e2e::{HttpProfileApi, ProfileApi};

/// Control API client for commands that talk to a running backend
pub(crate) fn api_client(config: &ApiConfig) -> Result<Arc<dyn ProfileApi>> {
    Ok(Arc::new(HttpProfileApi::new(config)?))
}
