//! profile-e2e: dual-channel end-to-end orchestration for profile management
//!
//! Every case provisions its fixtures through the control API, performs one
//! operation through the UI and then confirms the result through both the UI
//! and the API. Cleanup is replayed in reverse order whatever the outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SuiteRunner (scenarios, fail-fast, test-results.json)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Coordinator: provision -> act -> verify -> cleanup          │
//! │    ├── Provisioner  ── ProfileApi ── HttpProfileApi          │
//! │    ├── UiDriver     ── UiSurface  ── PlaywrightSurface       │
//! │    │     └── ProfileWizard (5-step FSM)                      │
//! │    └── StateVerifier                                         │
//! │          ├── ApiStateReader (StateObserver)                  │
//! │          └── UiStateReader  (StateObserver)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  stub: axum control API + SimulatedUi over one ProfileStore  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod browser_ui;
pub mod cases;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod playwright;
pub mod provisioner;
pub mod runner;
pub mod scenario;
pub mod selectors;
pub mod server;
pub mod stub;
pub mod ui;
pub mod verifier;
pub mod wizard;

pub use api::{HttpProfileApi, ProfileApi};
pub use cases::{BuiltinCase, CaseKind};
pub use config::HarnessConfig;
pub use coordinator::{CaseContext, CaseReport, CaseStatus, Coordinator, ProfileCase};
pub use driver::{SessionContext, UiDriver};
pub use error::{Channel, E2eError, E2eResult};
pub use provisioner::Provisioner;
pub use runner::{load_scenarios, CaseFilter, SuiteResult, SuiteRunner};
pub use scenario::Scenario;
pub use verifier::{Expected, StateVerifier};
pub use wizard::{ProfileWizard, WizardStep};
