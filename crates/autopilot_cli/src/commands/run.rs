//! Run command - Execute the agent pipeline once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use autopilot_agents::{
    AgentHandler, DevMonitorAgent, Orchestrator, QaReleaseAgent, Reporter, RunContext,
    ScrumMasterAgent, TriageAgent, DEFAULT_LOOKBACK_DAYS,
};
use autopilot_core::{KnowledgeStore, MessageBroker, SprintInfo};
use autopilot_services::{
    ConsoleReporter, EmailReporter, GeminiClassifier, GitActivitySource, JiraClient,
};

use crate::config::{self, ConfigError, Env};

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Board whose active sprint is processed
    #[arg(long, env = "BOARD_ID")]
    pub board_id: Option<u64>,

    /// Process this sprint instead of looking up the active one
    #[arg(long)]
    pub sprint_id: Option<i64>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// TOML file with developer profiles, used to seed an empty store
    #[arg(long, env = "AUTOPILOT_TEAM_FILE")]
    pub team_file: Option<PathBuf>,

    /// Git checkout to probe for recent commits per ticket
    #[arg(long, env = "AUTOPILOT_REPO")]
    pub repo: Option<PathBuf>,

    /// Days of commit history that count as recent activity
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    pub lookback_days: u32,

    /// Print the report instead of emailing it
    #[arg(long)]
    pub no_email: bool,

    /// Print the full run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let env = Env::from_process();

    let jira = Arc::new(JiraClient::new(config::jira_config(&env)?));
    let gemini = GeminiClassifier::new(config::gemini_config(&env)?);
    info!(model = gemini.model(), "Classifier configured");
    let classifier = Arc::new(gemini);
    let smtp = if args.no_email {
        None
    } else {
        config::smtp_config(&env)?
    };

    let sprint = match (args.sprint_id, args.board_id) {
        (Some(id), _) => SprintInfo::new(id, format!("Sprint {}", id)),
        (None, Some(board_id)) => {
            match jira
                .active_sprint(board_id)
                .await
                .context("Failed to look up the active sprint")?
            {
                Some(sprint) => sprint,
                None => {
                    println!("No active sprint found for board {}.", board_id);
                    println!("Start the sprint from the backlog view and run again.");
                    return Ok(());
                }
            }
        }
        (None, None) => return Err(ConfigError::MissingVar("BOARD_ID".to_string()).into()),
    };

    let store = KnowledgeStore::open(&args.store.db)
        .with_context(|| format!("Failed to open knowledge store at {}", args.store.db.display()))?;
    config::seed_team(&store, args.team_file.as_deref(), &env)?;

    let mut dev_monitor =
        DevMonitorAgent::new(jira.clone(), classifier.clone()).with_lookback_days(args.lookback_days);
    if let Some(repo) = &args.repo {
        if GitActivitySource::is_git_available() {
            dev_monitor = dev_monitor.with_activity(Arc::new(GitActivitySource::new(repo)));
        } else {
            warn!("git not found, activity probe disabled");
        }
    }

    let stages: Vec<Arc<dyn AgentHandler>> = vec![
        Arc::new(TriageAgent::new(jira.clone(), classifier)),
        Arc::new(dev_monitor),
        Arc::new(QaReleaseAgent::new(jira.clone())),
        Arc::new(ScrumMasterAgent::new(jira)),
    ];
    let mut orchestrator = Orchestrator::new(stages)?;

    let reporter: Option<Arc<dyn Reporter>> = match smtp {
        Some(smtp) => Some(Arc::new(EmailReporter::new(smtp))),
        None if args.json => None,
        None => {
            info!("Email not configured, printing report");
            Some(Arc::new(ConsoleReporter))
        }
    };
    if let Some(reporter) = reporter {
        orchestrator = orchestrator.with_reporter(reporter);
    }

    let broker = MessageBroker::new();
    let report = orchestrator
        .run(&RunContext::new(&store, &broker, &sprint))
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let failed: Vec<_> = report
        .reports
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.role.display_name())
        .collect();
    if failed.is_empty() {
        info!(sprint = %sprint.name, "All agents completed");
    } else {
        warn!(failed = ?failed, "Some agents failed; see the report");
    }

    Ok(())
}
