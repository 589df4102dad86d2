//! Core types for profile-e2e

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric profile identifier allocated by the backend
pub type ProfileId = i64;

/// Genie space association of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenieSpace {
    pub space_id: String,
    pub space_name: String,
}

/// A persisted profile as the control API returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_default: bool,
    #[serde(default)]
    pub slide_style_id: Option<i64>,
    #[serde(default)]
    pub deck_prompt_id: Option<i64>,
    #[serde(default)]
    pub genie_space: Option<GenieSpace>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Profile {
    /// Attributes a duplicate or an edit carries over from this profile
    pub fn attributes(&self) -> ProfileAttributes {
        ProfileAttributes {
            description: self.description.clone(),
            slide_style_id: self.slide_style_id,
            deck_prompt_id: self.deck_prompt_id,
            genie_space: self.genie_space.clone(),
        }
    }
}

/// Optional overrides applied on top of backend defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_style_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_prompt_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genie_space: Option<GenieSpace>,
}

impl ProfileAttributes {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_slide_style(mut self, slide_style_id: i64) -> Self {
        self.slide_style_id = Some(slide_style_id);
        self
    }

    pub fn with_deck_prompt(mut self, deck_prompt_id: i64) -> Self {
        self.deck_prompt_id = Some(deck_prompt_id);
        self
    }

    pub fn with_genie_space(mut self, space_id: &str, space_name: &str) -> Self {
        self.genie_space = Some(GenieSpace {
            space_id: space_id.to_string(),
            space_name: space_name.to_string(),
        });
        self
    }

    /// Overlay `self` onto `defaults`; fields set here win
    pub fn merged_over(&self, defaults: &ProfileAttributes) -> ProfileAttributes {
        ProfileAttributes {
            description: self.description.clone().or_else(|| defaults.description.clone()),
            slide_style_id: self.slide_style_id.or(defaults.slide_style_id),
            deck_prompt_id: self.deck_prompt_id.or(defaults.deck_prompt_id),
            genie_space: self.genie_space.clone().or_else(|| defaults.genie_space.clone()),
        }
    }
}

/// Body of `POST /profiles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: String,
    #[serde(flatten)]
    pub attributes: ProfileAttributes,
}

/// Body of `PUT /profiles/{id}`
///
/// Only present fields are applied unless `replace_attributes` is set, in
/// which case absent attributes are cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: ProfileAttributes,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace_attributes: bool,
}

impl ProfileUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Patch that keeps every attribute it does not name
    pub fn patch(attributes: ProfileAttributes) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Full attribute set; anything `None` in `attributes` is cleared
    pub fn replacing(name: Option<String>, attributes: ProfileAttributes) -> Self {
        Self {
            name,
            attributes,
            replace_attributes: true,
        }
    }

    /// Attribute values after applying this update to `current`
    pub fn apply_to(&self, current: &ProfileAttributes) -> ProfileAttributes {
        if self.replace_attributes {
            self.attributes.clone()
        } else {
            self.attributes.merged_over(current)
        }
    }
}

/// Body of `POST /profiles/{id}/duplicate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRequest {
    pub name: String,
}

/// Response of `POST /profiles/{id}/load`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub status: String,
    pub profile_id: ProfileId,
}

/// Slide style selectable in the wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideStyle {
    pub id: i64,
    pub name: String,
}

/// Working session bound to the profile current at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub profile_id: ProfileId,
    pub created_at: DateTime<Utc>,
}

/// Response of `POST /sessions/{id}/restore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub session_id: String,
    pub profile_id: ProfileId,
    /// True when restoring moved the current profile
    pub switched: bool,
}

/// Error body used by every non-2xx control API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_defaults() {
        let defaults = ProfileAttributes::default()
            .with_description("default text")
            .with_slide_style(1);
        let overrides = ProfileAttributes::default().with_slide_style(3);

        let merged = overrides.merged_over(&defaults);
        assert_eq!(merged.description.as_deref(), Some("default text"));
        assert_eq!(merged.slide_style_id, Some(3));
        assert_eq!(merged.genie_space, None);
    }

    #[test]
    fn test_new_profile_flattens_attributes() {
        let body = NewProfile {
            name: "Sales".to_string(),
            attributes: ProfileAttributes::default().with_slide_style(2),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["name"], "Sales");
        assert_eq!(json["slide_style_id"], 2);
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_profile_parses_api_payload() {
        let payload = r#"{
            "id": 12,
            "name": "E2E Test Create 1706600000000",
            "description": null,
            "is_default": false,
            "slide_style_id": 1,
            "created_at": "2024-01-30T07:33:20Z",
            "created_by": "e2e",
            "updated_at": "2024-01-30T07:33:20Z",
            "updated_by": "e2e"
        }"#;
        let profile: Profile = serde_json::from_str(payload).unwrap();
        assert_eq!(profile.id, 12);
        assert_eq!(profile.deck_prompt_id, None);
        assert_eq!(profile.attributes().slide_style_id, Some(1));
    }
}
