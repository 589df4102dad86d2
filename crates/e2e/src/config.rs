//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::E2eResult;
use crate::playwright::Browser;
use crate::selectors::Selectors;
use crate::server::ServerConfig;

/// Harness configuration, usually read from `profile-e2e.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Backend control API
    pub api: ApiConfig,

    /// Browser-facing UI
    pub ui: UiConfig,

    /// Application server to spawn before the suite (None = already running)
    pub server: Option<ServerConfig>,

    /// Suite execution
    pub run: RunConfig,
}

/// Control API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme, host and port of the backend
    pub base_url: String,

    /// Path prefix in front of every control API route
    pub prefix: String,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            prefix: "/api".to_string(),
            timeout_secs: 10,
        }
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Base URL the browser navigates to
    pub base_url: String,

    /// Path of the profile list page
    pub profiles_path: String,

    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Directory whose `node_modules` provides `playwright`
    pub node_project_dir: PathBuf,

    /// Upper bound for a single bridge command
    pub command_timeout_ms: u64,

    /// Where failure screenshots are written
    pub screenshot_dir: PathBuf,

    /// Element locators
    pub selectors: Selectors,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            profiles_path: "/profiles".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_project_dir: PathBuf::from("."),
            command_timeout_ms: 15_000,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            selectors: Selectors::default(),
        }
    }
}

/// Suite execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory scanned for scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Stop the suite after the first UI/API inconsistency
    pub fail_fast: bool,

    /// Capture a screenshot artifact when a case fails
    pub screenshot_on_failure: bool,

    /// Observations per verification before a mismatch is reported
    pub settle_attempts: u32,

    /// Pause between verification attempts
    pub settle_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("tests/scenarios"),
            output_dir: PathBuf::from("test-results"),
            fail_fast: false,
            screenshot_on_failure: true,
            settle_attempts: 3,
            settle_interval_ms: 250,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.prefix, "/api");
        assert!(config.server.is_none());
        assert!(!config.run.fail_fast);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile-e2e.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "http://localhost:9000"

[ui]
browser = "firefox"

[ui.selectors]
profile_row = '[data-test="row"]'

[run]
fail_fast = true
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:9000");
        assert_eq!(config.api.timeout_secs, 10);
        assert!(matches!(config.ui.browser, Browser::Firefox));
        assert_eq!(config.ui.selectors.profile_row, r#"[data-test="row"]"#);
        assert_eq!(config.ui.selectors.next_button, Selectors::default().next_button);
        assert!(config.run.fail_fast);
    }
}
