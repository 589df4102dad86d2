//! Error types for E2E testing

use profile_e2e_common::ProfileId;
use thiserror::Error;

use crate::wizard::{GuardError, WizardControl, WizardStep};

/// Observation channel an error or value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ui,
    Api,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Ui => write!(f, "ui"),
            Channel::Api => write!(f, "api"),
        }
    }
}

#[derive(Error, Debug)]
pub enum E2eError {
    /// Duplicate name; `detail` is the server's message verbatim
    #[error("{detail}")]
    Conflict { name: String, detail: String },

    #[error("{kind} {id} not found via {channel}")]
    NotFound {
        kind: String,
        id: String,
        channel: Channel,
    },

    #[error("Validation: {0}")]
    Validation(#[from] GuardError),

    #[error("UI and API disagree on {attribute} of profile {profile_id}: ui={ui}, api={api}")]
    Inconsistency {
        profile_id: ProfileId,
        attribute: String,
        ui: String,
        api: String,
    },

    #[error("UI and API disagree on which profiles are {marker}: ui={ui:?}, api={api:?}")]
    MarkerMismatch {
        marker: String,
        ui: Vec<String>,
        api: Vec<String>,
    },

    #[error("{0}")]
    LastEntity(String),

    #[error("Guard mismatch at {step:?}: {control:?} expected enabled={expected}, UI shows enabled={actual}")]
    GuardMismatch {
        step: WizardStep,
        control: WizardControl,
        expected: bool,
        actual: bool,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Fixture setup failed: {0}")]
    FixtureSetup(String),

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Case panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    pub fn not_found(kind: &str, id: impl ToString, channel: Channel) -> Self {
        E2eError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
            channel,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, E2eError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, E2eError::Conflict { .. })
    }

    /// Divergence between the presentation and persistence layers
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            E2eError::Inconsistency { .. } | E2eError::MarkerMismatch { .. }
        )
    }
}

/// Store errors surface the way the HTTP API would report them
impl From<profile_e2e_common::Error> for E2eError {
    fn from(e: profile_e2e_common::Error) -> Self {
        use profile_e2e_common::Error;
        match e {
            Error::NotFound { kind, id } => E2eError::NotFound {
                kind,
                id,
                channel: Channel::Api,
            },
            Error::Conflict { name, detail } => E2eError::Conflict { name, detail },
            Error::LastProfile(detail) => E2eError::LastEntity(detail),
            other => E2eError::Api {
                status: other.status_code(),
                detail: other.to_string(),
            },
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
