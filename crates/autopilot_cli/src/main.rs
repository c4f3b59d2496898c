//! Sprint Autopilot CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Tracker or model API error
//! - 5: Knowledge store error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use autopilot_agents::AgentError;
use autopilot_core::CoreError;
use autopilot_services::ServiceError;
use commands::{Cli, Commands, LogFormat};
use config::ConfigError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const API_ERROR: u8 = 4;
    pub const STORE_ERROR: u8 = 5;
}

const DEFAULT_FILTER: &str = "autopilot=info,warn";

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("autopilot=debug,info")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = match cli.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::FindSprint(args) => commands::find_sprint::execute(args).await,
        Commands::ListModels(args) => commands::list_models::execute(args).await,
        Commands::Team(args) => commands::team::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.is::<ConfigError>() {
            return ExitCodes::CONFIG_ERROR;
        }
        if cause.is::<ServiceError>() {
            return ExitCodes::API_ERROR;
        }
        if cause.is::<CoreError>() {
            return ExitCodes::STORE_ERROR;
        }
        if let Some(agent_error) = cause.downcast_ref::<AgentError>() {
            return match agent_error {
                AgentError::Core(_) => ExitCodes::STORE_ERROR,
                AgentError::InvalidPipeline(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
    }

    if e.to_string().to_lowercase().contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_map_to_config_exit_code() {
        let e = anyhow::Error::new(ConfigError::MissingVar("JIRA_DOMAIN".into())).context("run failed");
        assert_eq!(categorize_error(&e), ExitCodes::CONFIG_ERROR);
    }

    #[test]
    fn test_api_errors_map_to_api_exit_code() {
        let e = anyhow::Error::new(ServiceError::Api {
            status: 401,
            body: "Unauthorized".into(),
        })
        .context("Failed to look up the active sprint");
        assert_eq!(categorize_error(&e), ExitCodes::API_ERROR);
    }

    #[test]
    fn test_missing_store_is_invalid_args() {
        let e = anyhow::anyhow!("Knowledge store not found: data/sprint_data.db");
        assert_eq!(categorize_error(&e), ExitCodes::INVALID_ARGS);
    }
}
