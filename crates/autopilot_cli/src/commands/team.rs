//! Team command - Show developer profiles and sprint history.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use autopilot_core::{
    BalanceReport, DeveloperProfile, KnowledgeStore, SprintSnapshot, WorkloadBalancer,
    DEFAULT_VELOCITY_WINDOW,
};

use super::StoreArgs;

#[derive(Args, Debug)]
pub struct TeamArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Number of past sprints to show
    #[arg(long, default_value_t = 5)]
    pub history: usize,

    /// Remove a developer profile (by developer id) before listing
    #[arg(long, value_name = "DEVELOPER_ID")]
    pub remove: Option<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TeamOverview {
    developers: Vec<DeveloperProfile>,
    history: Vec<SprintSnapshot>,
    average_velocity: f64,
    balance: Option<BalanceReport>,
}

fn overview(store: &KnowledgeStore, history: usize) -> Result<TeamOverview> {
    let developers = store.all_profiles()?;
    Ok(TeamOverview {
        balance: WorkloadBalancer::analyze(&developers),
        history: store.recent_history(history)?,
        average_velocity: store.average_velocity(DEFAULT_VELOCITY_WINDOW)?,
        developers,
    })
}

pub async fn execute(args: TeamArgs) -> Result<()> {
    if !args.store.db.exists() {
        anyhow::bail!("Knowledge store not found: {}", args.store.db.display());
    }
    let store = KnowledgeStore::open(&args.store.db)
        .with_context(|| format!("Failed to open knowledge store at {}", args.store.db.display()))?;

    if let Some(developer_id) = &args.remove {
        if !store.remove_profile(developer_id)? {
            anyhow::bail!("Developer not found: {}", developer_id);
        }
        info!(developer_id = %developer_id, "Developer removed from the team");
    }

    let overview = overview(&store, args.history)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("Developers ({}):", overview.developers.len());
    for dev in &overview.developers {
        println!(
            "  {:<24} {:<10} workload {:>2}  ({})",
            dev.name,
            dev.specialization.as_str(),
            dev.current_workload,
            dev.developer_id
        );
    }
    if let Some(balance) = &overview.balance {
        for line in balance.lines() {
            println!("  {}", line);
        }
    }

    println!("\nSprint history (newest first):");
    if overview.history.is_empty() {
        println!("  none recorded yet");
    }
    for snapshot in &overview.history {
        let start = snapshot
            .start_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  sprint {:<6} {} .. {}  completed {}",
            snapshot.sprint_id, start, snapshot.end_date, snapshot.completed_count
        );
    }
    println!(
        "\nAverage velocity (last {} sprints): {:.1}",
        DEFAULT_VELOCITY_WINDOW, overview.average_velocity
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::Specialization;
    use chrono::NaiveDate;

    #[test]
    fn test_overview_serializes() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .seed_profiles(&[DeveloperProfile::new("be-1", "Bea", Specialization::Backend).with_workload(3)])
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        store.record_snapshot(&SprintSnapshot::new(1, end, 8)).unwrap();

        let overview = overview(&store, 5).unwrap();
        assert_eq!(overview.average_velocity, 8.0);

        let json = serde_json::to_value(&overview).unwrap();
        assert_eq!(json["developers"][0]["developer_id"], "be-1");
        assert_eq!(json["history"][0]["completed_count"], 8);
        assert_eq!(json["balance"]["status"], "balanced");
    }

    #[tokio::test]
    async fn test_remove_developer() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sprint.db");
        {
            let store = KnowledgeStore::open(&db).unwrap();
            store
                .seed_profiles(&[
                    DeveloperProfile::new("be-1", "Bea", Specialization::Backend),
                    DeveloperProfile::new("fe-1", "Fin", Specialization::Frontend),
                ])
                .unwrap();
        }

        let args = |remove: &str| TeamArgs {
            store: StoreArgs { db: db.clone() },
            history: 5,
            remove: Some(remove.to_string()),
            json: true,
        };
        execute(args("fe-1")).await.unwrap();
        let err = execute(args("fe-1")).await.unwrap_err();
        assert!(err.to_string().contains("Developer not found"));

        let store = KnowledgeStore::open(&db).unwrap();
        let ids: Vec<String> = store.all_profiles().unwrap().into_iter().map(|p| p.developer_id).collect();
        assert_eq!(ids, vec!["be-1"]);
    }
}
