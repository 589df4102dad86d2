//! Control API health

use anyhow::Result;
use profile_e2e::config::HarnessConfig;
use serde::Serialize;

use super::api_client;
use crate::output::{print_error, print_structured, print_success, OutputFormat};

#[derive(Debug, Serialize)]
struct StatusReport {
    api: String,
    healthy: bool,
    error: Option<String>,
    profiles: Option<usize>,
    current_profile: Option<String>,
}

/// Returns whether the API answered
pub async fn execute(config: &HarnessConfig, format: OutputFormat) -> Result<bool> {
    let api = api_client(&config.api)?;
    let mut report = StatusReport {
        api: config.api.base_url.clone(),
        healthy: false,
        error: None,
        profiles: None,
        current_profile: None,
    };

    match api.health().await {
        Ok(()) => {
            report.healthy = true;
            report.profiles = api.list_profiles().await.ok().map(|p| p.len());
            report.current_profile = api.current_profile().await.ok().map(|p| p.name);
        }
        Err(e) => report.error = Some(e.to_string()),
    }

    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_structured(&report, format),
        _ => {
            if report.healthy {
                print_success(&format!("Control API is healthy at {}", report.api));
                if let Some(count) = report.profiles {
                    println!("   Profiles: {}", count);
                }
                if let Some(name) = &report.current_profile {
                    println!("   Loaded:   {}", name);
                }
            } else {
                print_error(&format!(
                    "Control API is not responding at {}: {}",
                    report.api,
                    report.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
    }

    Ok(report.healthy)
}
