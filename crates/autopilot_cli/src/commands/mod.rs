//! CLI command definitions.
//!
//! Each subcommand maps to one entry point of the sprint autopilot.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub mod find_sprint;
pub mod list_models;
pub mod run;
pub mod team;

/// Sprint Autopilot - autonomous sprint operations for Jira teams
#[derive(Parser)]
#[command(name = "autopilot")]
#[command(version, about = "Sprint Autopilot - autonomous sprint operations for Jira teams")]
#[command(long_about = r#"
Sprint Autopilot runs a fixed pipeline of agents against the active sprint:

  triage        → classify unassigned tickets and assign them by workload
  dev-monitor   → read the latest comments, detect blockers and stalled work
  qa-release    → list tickets waiting for review
  scrum-master  → record sprint health, forecast risk, escalate signals

COMMANDS:
  run           → run the pipeline once and deliver the report
  find-sprint   → print the active sprint of a board
  list-models   → list Gemini models that can generate content
  team          → show developer profiles and sprint history

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Tracker or model API error
  5 - Knowledge store error
"#)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run all agents once against the active sprint
    Run(run::RunArgs),

    /// Print the active sprint of a board
    FindSprint(find_sprint::FindSprintArgs),

    /// List Gemini models that support content generation
    ListModels(list_models::ListModelsArgs),

    /// Show developer profiles and recent sprint history
    Team(team::TeamArgs),
}

/// Knowledge store location shared by commands that open it.
#[derive(clap::Args, Debug, Clone)]
pub struct StoreArgs {
    /// Path to the SQLite knowledge store
    #[arg(long = "db", env = "AUTOPILOT_DB", default_value = "data/sprint_data.db")]
    pub db: PathBuf,
}
