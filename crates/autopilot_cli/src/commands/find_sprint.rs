//! Find-sprint command - Print the active sprint of a board.

use anyhow::{Context, Result};
use clap::Args;

use autopilot_services::JiraClient;

use crate::config::{self, Env};

#[derive(Args, Debug)]
pub struct FindSprintArgs {
    /// Board to inspect
    #[arg(long, env = "BOARD_ID")]
    pub board_id: u64,
}

pub async fn execute(args: FindSprintArgs) -> Result<()> {
    let env = Env::from_process();
    let jira = JiraClient::new(config::jira_config(&env)?);

    let sprint = jira
        .active_sprint(args.board_id)
        .await
        .context("Failed to look up the active sprint")?;

    match sprint {
        Some(sprint) => {
            println!("Active sprint on board {}:", args.board_id);
            println!("   Name:  {}", sprint.name);
            println!("   ID:    {}", sprint.id);
            if let (Some(start), Some(end)) = (&sprint.start_date, &sprint.end_date) {
                println!("   Dates: {} -> {}", start, end);
            }
        }
        None => {
            println!("No active sprint was found for board {}.", args.board_id);
            println!("Start the sprint from the backlog view first.");
        }
    }

    Ok(())
}
