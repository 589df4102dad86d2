//! In-process backend for self-tests
//!
//! `api` serves the control API over an in-memory store and `ui` renders the
//! same store, so the whole harness runs without a browser or the real app.

pub mod api;
pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{HttpProfileApi, ProfileApi};
use crate::config::RunConfig;
use crate::coordinator::Coordinator;
use crate::error::E2eResult;
use crate::runner::{assemble, SuiteRunner};

pub use api::{router, StubServer, STUB_ACTOR};
pub use ui::{Faults, SimulatedUi};

/// Stub API, simulated UI and a real HTTP client wired together
pub struct StubHarness {
    pub server: StubServer,
    pub ui: Arc<SimulatedUi>,
    pub api: Arc<HttpProfileApi>,
}

impl StubHarness {
    /// Serve a fresh store; `snapshot_dir` receives page snapshots of failed cases
    pub async fn start(faults: Faults, snapshot_dir: Option<PathBuf>) -> E2eResult<Self> {
        let server = StubServer::serve_memory().await?;
        let api = Arc::new(HttpProfileApi::new(&server.api_config())?);

        let mut ui = SimulatedUi::new(server.store.clone()).with_faults(faults);
        if let Some(dir) = snapshot_dir {
            ui = ui.with_snapshot_dir(dir);
        }

        Ok(Self {
            server,
            ui: Arc::new(ui),
            api,
        })
    }

    pub fn coordinator(&self, run: &RunConfig) -> Coordinator {
        let api: Arc<dyn ProfileApi> = self.api.clone();
        assemble(api, self.ui.clone(), run).screenshot_on_failure(run.screenshot_on_failure)
    }

    pub fn runner(&self, run: &RunConfig) -> SuiteRunner {
        SuiteRunner::new(self.coordinator(run), run)
    }
}
