//! List scenarios and the cases they expand to

use anyhow::Result;
use clap::Args;
use profile_e2e::config::HarnessConfig;
use profile_e2e::{load_scenarios, CaseFilter, ProfileCase, Scenario};
use serde::Serialize;
use std::path::PathBuf;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only scenarios carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Scenario directory
    #[arg(long)]
    pub scenarios: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CaseListing {
    pub scenario: String,
    pub case: String,
    pub operation: String,
    pub tags: Vec<String>,
}

impl TableDisplay for CaseListing {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Case", "Operation", "Tags"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            self.case.clone(),
            self.operation.clone(),
            self.tags.join(", "),
        ]
    }
}

/// One row per case, in scenario order
pub fn listings(scenarios: &[Scenario], tag: Option<&str>) -> Vec<CaseListing> {
    let filter = CaseFilter {
        tag: tag.map(str::to_string),
        name: None,
    };
    scenarios
        .iter()
        .flat_map(|scenario| {
            filter
                .select(std::slice::from_ref(scenario))
                .into_iter()
                .map(move |case| CaseListing {
                    scenario: scenario.name.clone(),
                    case: case.name().to_string(),
                    operation: case.operation().to_string(),
                    tags: scenario.tags.clone(),
                })
        })
        .collect()
}

pub fn execute(args: ListArgs, config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    let dir = args.scenarios.as_ref().unwrap_or(&config.run.scenarios_dir);
    let scenarios = load_scenarios(dir)?;
    print_list(&listings(&scenarios, args.tag.as_deref()), format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMOKE: &str = r#"
name: smoke
tags: [smoke]
cases:
  - case: set_default
  - case: rename
"#;

    #[test]
    fn test_listings_follow_tag() {
        let scenarios = vec![Scenario::from_yaml(SMOKE).unwrap(), Scenario::builtin()];

        let smoke = listings(&scenarios, Some("smoke"));
        assert_eq!(smoke.len(), 2);
        assert_eq!(smoke[0].case, "smoke/set_default");
        assert_eq!(smoke[1].operation, "Rename");

        let all = listings(&scenarios, None);
        assert_eq!(all.len(), 2 + Scenario::builtin().cases.len());
    }
}
