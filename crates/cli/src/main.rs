//! profile-e2e CLI - Main Entry Point

use clap::{Parser, Subcommand};
use profile_e2e::HarnessConfig;
use std::path::PathBuf;

use profile_e2e_cli::commands::{list, profiles, run, status, sweep};
use profile_e2e_cli::output;

/// Dual-channel end-to-end tests for profile management
#[derive(Parser)]
#[command(name = "profile-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, short, env = "PROFILE_E2E_CONFIG", default_value = "profile-e2e.toml", global = true)]
    config: PathBuf,

    /// Control API base URL, overriding the configuration file
    #[arg(long, env = "PROFILE_E2E_API_URL", global = true)]
    api_url: Option<String>,

    /// Application UI base URL, overriding the configuration file
    #[arg(long, env = "PROFILE_E2E_UI_URL", global = true)]
    ui_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios
    Run(run::RunArgs),

    /// List scenarios and their cases
    List(list::ListArgs),

    /// List profiles held by the backend
    Profiles,

    /// Delete leaked test fixtures
    Sweep(sweep::SweepArgs),

    /// Check control API health
    Status,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let mut config = HarnessConfig::load(&cli.config)?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if let Some(url) = cli.ui_url {
        config.ui.base_url = url;
    }

    let ok = match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await?,
        Commands::List(args) => {
            list::execute(args, &config, cli.format)?;
            true
        }
        Commands::Profiles => {
            profiles::execute(&config, cli.format).await?;
            true
        }
        Commands::Sweep(args) => sweep::execute(args, &config, cli.format).await?,
        Commands::Status => status::execute(&config, cli.format).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::parse_from([
            "profile-e2e",
            "--format",
            "json",
            "run",
            "--stub",
            "--tag",
            "smoke",
            "--fail-fast",
        ]);
        assert_eq!(cli.format, output::OutputFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.stub);
                assert!(args.fail_fast);
                assert_eq!(args.tag.as_deref(), Some("smoke"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_sweep_defaults_to_fixture_prefix() {
        let cli = Cli::parse_from(["profile-e2e", "sweep", "--dry-run"]);
        match cli.command {
            Commands::Sweep(args) => {
                assert!(args.dry_run);
                assert_eq!(args.prefix, profile_e2e_common::FIXTURE_PREFIX);
            }
            _ => panic!("expected sweep"),
        }
    }
}
