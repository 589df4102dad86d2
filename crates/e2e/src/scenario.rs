//! Declarative YAML scenarios
//!
//! A scenario names a list of built-in cases with their parameters:
//!
//! ```yaml
//! name: profile-crud
//! description: Create, rename and delete through the UI
//! tags: [smoke, crud]
//! cases:
//!   - case: create_via_wizard
//!     attributes:
//!       description: From the wizard
//!   - case: rename
//!   - name: delete-from-list
//!     case: delete_via_ui
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cases::{BuiltinCase, CaseKind};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    pub cases: Vec<CaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEntry {
    /// Display name; defaults to `{scenario}/{case}`
    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub kind: CaseKind,
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        if scenario.cases.is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}' lists no cases",
                scenario.name
            )));
        }
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load every `.yaml`/`.yml` file below `dir`, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Built-in scenario running every case once
    pub fn builtin() -> Self {
        Self {
            name: "builtin".to_string(),
            description: "Every built-in case with default parameters".to_string(),
            tags: vec!["builtin".to_string()],
            cases: CaseKind::all()
                .into_iter()
                .map(|kind| CaseEntry { name: None, kind })
                .collect(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Cases ready to hand to the coordinator
    pub fn instantiate(&self) -> Vec<BuiltinCase> {
        self.cases
            .iter()
            .map(|entry| {
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}", self.name, entry.kind.key()));
                BuiltinCase::new(name, entry.kind.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ProfileCase;
    use profile_e2e_common::ProfileAttributes;

    const CRUD: &str = r#"
name: profile-crud
description: Create, rename and delete through the UI
tags:
  - smoke
  - crud
cases:
  - case: create_via_wizard
    attributes:
      description: From the wizard
      slide_style_id: 2
  - case: rename
  - name: delete-from-list
    case: delete_via_ui
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(CRUD).unwrap();
        assert_eq!(scenario.name, "profile-crud");
        assert!(scenario.has_tag("smoke"));
        assert_eq!(scenario.cases.len(), 3);
        assert_eq!(
            scenario.cases[0].kind,
            CaseKind::CreateViaWizard {
                attributes: ProfileAttributes::default()
                    .with_description("From the wizard")
                    .with_slide_style(2),
            }
        );

        let cases = scenario.instantiate();
        assert_eq!(cases[1].name(), "profile-crud/rename");
        assert_eq!(cases[2].name(), "delete-from-list");
        assert_eq!(cases[2].operation(), "Delete");
    }

    #[test]
    fn test_unknown_case_is_rejected() {
        let yaml = "name: bad\ncases:\n  - case: teleport\n";
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_case_list_is_rejected() {
        let err = Scenario::from_yaml("name: empty\ncases: []\n").unwrap_err();
        assert!(matches!(err, E2eError::ScenarioParse(_)));
    }

    #[test]
    fn test_load_all_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.yml"), "name: b\ncases:\n  - case: rename\n").unwrap();
        std::fs::write(dir.path().join("a.yaml"), CRUD).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["profile-crud", "b"]);
        assert!(scenarios[0].has_tag("crud"));
    }

    #[test]
    fn test_builtin_covers_every_case() {
        assert_eq!(Scenario::builtin().instantiate().len(), CaseKind::all().len());
    }
}
