//! Profiles currently held by the backend

use anyhow::Result;
use profile_e2e::config::HarnessConfig;
use profile_e2e_common::{Profile, FIXTURE_PREFIX};
use serde::Serialize;

use super::api_client;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Debug, Serialize)]
pub struct ProfileDisplay {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub loaded: bool,
    pub fixture: bool,
    pub description: Option<String>,
    pub slide_style_id: Option<i64>,
    pub genie_space: Option<String>,
    pub updated_at: String,
}

impl ProfileDisplay {
    pub fn new(profile: Profile, current: i64) -> Self {
        Self {
            loaded: profile.id == current,
            fixture: profile.name.starts_with(FIXTURE_PREFIX),
            id: profile.id,
            name: profile.name,
            is_default: profile.is_default,
            description: profile.description,
            slide_style_id: profile.slide_style_id,
            genie_space: profile.genie_space.map(|g| g.space_name),
            updated_at: profile.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl TableDisplay for ProfileDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "Badges", "Style", "Genie Space", "Description", "Updated"]
    }

    fn row(&self) -> Vec<String> {
        let mut badges = Vec::new();
        if self.is_default {
            badges.push("Default");
        }
        if self.loaded {
            badges.push("Loaded");
        }
        if self.fixture {
            badges.push("fixture");
        }

        vec![
            self.id.to_string(),
            self.name.clone(),
            badges.join(" "),
            self.slide_style_id.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            self.genie_space.clone().unwrap_or_else(|| "-".to_string()),
            self.description.clone().unwrap_or_default().chars().take(40).collect(),
            self.updated_at.clone(),
        ]
    }
}

pub async fn execute(config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    let api = api_client(&config.api)?;
    let current = api.current_profile().await?.id;
    let displays: Vec<ProfileDisplay> = api
        .list_profiles()
        .await?
        .into_iter()
        .map(|p| ProfileDisplay::new(p, current))
        .collect();
    print_list(&displays, format);
    Ok(())
}
