//! Scrum master agent: sprint health, risk, balance and escalations.
//!
//! Runs last. It drains the broker before anything else, so every signal
//! published earlier in the run is handled exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use autopilot_core::{
    parse_timestamp, Message, Priority, RiskAnalyzer, RiskReport, SprintSnapshot, SprintWindow,
    Ticket, Topic, VelocityRisk, WorkloadBalancer, DEFAULT_VELOCITY_WINDOW,
};

use crate::collaborators::{FieldUpdate, TicketQuery, TicketSource};
use crate::error::AgentResult;
use crate::roles::AgentRole;
use crate::traits::{ActionTaken, ActionType, AgentHandler, AgentIssue, AgentReport, RunContext};

/// Scrum master agent.
pub struct ScrumMasterAgent {
    tracker: Arc<dyn TicketSource>,
    now: Option<DateTime<Utc>>,
    velocity_window: usize,
}

impl ScrumMasterAgent {
    pub fn new(tracker: Arc<dyn TicketSource>) -> Self {
        Self {
            tracker,
            now: None,
            velocity_window: DEFAULT_VELOCITY_WINDOW,
        }
    }

    /// Evaluate risk at a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_velocity_window(mut self, sprints: usize) -> Self {
        self.velocity_window = sprints.max(1);
        self
    }

    fn analyzer(&self) -> RiskAnalyzer {
        self.now.map(RiskAnalyzer::at).unwrap_or_default()
    }

    fn record_health(&self, ctx: &RunContext<'_>, completed: u32, velocity: Option<f64>, report: &mut AgentReport) {
        let today = self.now.unwrap_or_else(Utc::now).date_naive();
        let mut snapshot = SprintSnapshot::new(ctx.sprint.id, today, completed);
        if let Some(start) = ctx.sprint.start_date.as_deref().and_then(|s| parse_timestamp(s).ok()) {
            snapshot = snapshot.with_start(start.date_naive());
        }
        if let Some(velocity) = velocity {
            snapshot = snapshot.with_velocity(velocity);
        }

        match ctx.store.record_snapshot(&snapshot) {
            Ok(count) => {
                report.push_line(format!("- Completed tickets: {} (recorded)", count));
                report.record_action(ActionTaken::new(
                    ActionType::Recorded,
                    format!("Sprint {} snapshot with {} completed", ctx.sprint.id, count),
                ));
            }
            Err(e) => {
                warn!(sprint_id = ctx.sprint.id, "Sprint health not recorded: {}", e);
                report.push_line(format!("- Completed tickets: {} (unrecorded)", completed));
                report.push_issue(AgentIssue::error("storage", e.to_string()));
            }
        }
    }

    fn assess_risk(
        &self,
        ctx: &RunContext<'_>,
        completed: u32,
        velocity: Option<f64>,
        tickets: &[Ticket],
    ) -> RiskReport {
        let analyzer = self.analyzer();
        match velocity {
            Some(average) => analyzer.analyze(ctx.sprint, completed, average, tickets),
            None => RiskReport {
                velocity: VelocityRisk::NotComputed {
                    reason: "velocity history unavailable".to_string(),
                },
                scope_creep: SprintWindow::from_sprint(ctx.sprint)
                    .ok()
                    .map(|window| analyzer.scope_creep(window.start, tickets)),
            },
        }
    }

    fn check_balance(&self, ctx: &RunContext<'_>, report: &mut AgentReport) {
        match ctx.store.all_profiles() {
            Ok(profiles) => match WorkloadBalancer::analyze(&profiles) {
                Some(balance) => {
                    for line in balance.lines() {
                        report.push_line(line);
                    }
                }
                None => report.push_line("- No developer profiles registered"),
            },
            Err(e) => {
                warn!("Profiles unavailable for balance check: {}", e);
                report.push_issue(AgentIssue::error("storage", e.to_string()));
            }
        }
    }

    async fn escalate(&self, message: &Message, report: &mut AgentReport) {
        let Some(key) = message.ticket_key.as_deref() else {
            report.push_line(format!("- From {}: {}", message.sender, message.content));
            return;
        };

        match message.topic {
            Topic::Blocker => {
                info!(ticket = key, "Escalating blocker");
                if let Err(e) = self
                    .tracker
                    .update_fields(key, &FieldUpdate::priority(Priority::Highest))
                    .await
                {
                    report.push_issue(AgentIssue::error("escalation", e.to_string()).for_ticket(key));
                } else {
                    report.record_action(
                        ActionTaken::new(ActionType::Escalated, "Priority raised to Highest").on(key),
                    );
                }
                let comment = format!(
                    "Scrum Master Agent: a blocker was reported on this ticket ({}). Priority raised to Highest.",
                    message.content
                );
                self.comment(key, &comment, report).await;
                report.push_line(format!("- **{}**: blocker escalated to Highest priority", key));
            }
            Topic::NoActivity => {
                let comment =
                    "Scrum Master Agent: no recent code activity was found for this ticket. Could you post a status update?";
                self.comment(key, comment, report).await;
                report.push_line(format!("- **{}**: asked assignee for a status update", key));
            }
            Topic::Unassignable => {
                report.push_line(format!(
                    "- **{}**: needs manual assignment ({})",
                    key, message.content
                ));
            }
            Topic::General => {
                report.push_line(format!("- **{}**: {} (from {})", key, message.content, message.sender));
            }
        }
    }

    async fn comment(&self, key: &str, text: &str, report: &mut AgentReport) {
        match self.tracker.add_comment(key, text).await {
            Ok(()) => report.record_action(ActionTaken::new(ActionType::Commented, text).on(key)),
            Err(e) => {
                warn!(ticket = key, "Escalation comment not posted: {}", e);
                report.push_issue(AgentIssue::warning("comment", e.to_string()).for_ticket(key));
            }
        }
    }
}

#[async_trait]
impl AgentHandler for ScrumMasterAgent {
    fn role(&self) -> AgentRole {
        AgentRole::ScrumMaster
    }

    async fn process(&self, ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
        let messages = ctx.broker.drain();
        info!(sprint_id = ctx.sprint.id, signals = messages.len(), "Sprint health check started");

        let mut report = AgentReport::success(
            self.role(),
            format!("Sprint health for **{}** (id {}).", ctx.sprint.name, ctx.sprint.id),
        );

        let tickets = match self.tracker.search(TicketQuery::Sprint(ctx.sprint.id)).await {
            Ok(tickets) => Some(tickets),
            Err(e) => {
                warn!(sprint_id = ctx.sprint.id, "Sprint tickets unavailable: {}", e);
                report.push_issue(AgentIssue::error("tracker", e.to_string()));
                None
            }
        };

        let velocity = match ctx
            .store
            .average_velocity_excluding(ctx.sprint.id, self.velocity_window)
        {
            Ok(average) => Some(average),
            Err(e) => {
                warn!("Velocity history unavailable: {}", e);
                report.push_issue(AgentIssue::error("storage", e.to_string()));
                None
            }
        };

        match &tickets {
            Some(tickets) => {
                report.push_line(format!("**Sprint tickets ({}):**", tickets.len()));
                for ticket in tickets {
                    report.push_line(format!("- {} [{}]: {}", ticket.key, ticket.status, ticket.summary));
                }

                let completed = tickets.iter().filter(|t| t.status.is_done()).count() as u32;
                report.push_line("**Health:**");
                self.record_health(ctx, completed, velocity, &mut report);
                for line in self.assess_risk(ctx, completed, velocity, tickets).lines() {
                    report.push_line(line);
                }
            }
            None => {
                report.push_line("**Health:**");
                report.push_line("- Velocity risk: not computed (sprint tickets unavailable)");
            }
        }

        report.push_line("**Workload:**");
        self.check_balance(ctx, &mut report);

        if !messages.is_empty() {
            report.push_line(format!("**Agent signals ({}):**", messages.len()));
            for message in &messages {
                self.escalate(message, &mut report).await;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryTracker, TrackerCall, TrackerOp};
    use autopilot_core::{
        DeveloperProfile, KnowledgeStore, MessageBroker, Specialization, SprintInfo, TicketStatus,
    };
    use chrono::NaiveDate;

    fn now() -> DateTime<Utc> {
        parse_timestamp("2024-01-06T00:00:00Z").unwrap()
    }

    fn sprint() -> SprintInfo {
        SprintInfo::new(42, "Sprint 42").with_dates("2024-01-01T00:00:00.000Z", "2024-01-11T00:00:00.000Z")
    }

    fn sprint_tickets() -> Vec<Ticket> {
        vec![
            Ticket::new("SM-1", "Login", TicketStatus::Done).with_created("2023-12-28T09:00:00.000+0000"),
            Ticket::new("SM-2", "Logout", TicketStatus::Done).with_created("2023-12-28T09:00:00.000+0000"),
            Ticket::new("SM-3", "Hotfix", TicketStatus::InProgress).with_created("2024-01-03T09:00:00.000+0000"),
        ]
    }

    #[tokio::test]
    async fn test_health_risk_and_snapshot() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let past = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        store.record_snapshot(&SprintSnapshot::new(41, past, 10)).unwrap();
        let broker = MessageBroker::new();
        let sprint = sprint();
        let tracker = Arc::new(
            InMemoryTracker::new().with_tickets(TicketQuery::Sprint(42), sprint_tickets()),
        );
        let agent = ScrumMasterAgent::new(tracker).at(now());

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();
        let rendered = report.render();

        // 2 done against 5 expected at half-sprint.
        assert!(rendered.contains("Velocity risk: HIGH"));
        assert!(rendered.contains("SM-3"));
        assert!(rendered.contains("Completed tickets: 2 (recorded)"));

        let snapshot = store.snapshot(42).unwrap().unwrap();
        assert_eq!(snapshot.completed_count, 2);
        assert_eq!(snapshot.team_velocity, Some(10.0));
        assert_eq!(snapshot.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[tokio::test]
    async fn test_rerun_replaces_snapshot() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = sprint();
        let tracker = Arc::new(
            InMemoryTracker::new().with_tickets(TicketQuery::Sprint(42), sprint_tickets()),
        );
        let agent = ScrumMasterAgent::new(tracker).at(now());
        let ctx = RunContext::new(&store, &broker, &sprint);

        agent.process(&ctx).await.unwrap();
        agent.process(&ctx).await.unwrap();

        assert_eq!(store.recent_history(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_escalates_each_signal_once() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        broker.publish_message(
            Message::new("dev_monitor", "SM-4 is blocked").on_topic(Topic::Blocker).about("SM-4"),
        );
        broker.publish_message(
            Message::new("dev_monitor", "No commits").on_topic(Topic::NoActivity).about("SM-5"),
        );
        broker.publish_message(
            Message::new("triage", "needs Frontend").on_topic(Topic::Unassignable).about("SM-6"),
        );
        let sprint = sprint();
        let tracker = Arc::new(InMemoryTracker::new());
        let agent = ScrumMasterAgent::new(tracker.clone()).at(now());

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert!(broker.is_empty());
        assert!(tracker.calls().contains(&TrackerCall::UpdateFields {
            key: "SM-4".into(),
            update: FieldUpdate::priority(Priority::Highest),
        }));
        assert_eq!(tracker.comments_on("SM-4").len(), 1);
        assert_eq!(tracker.comments_on("SM-5").len(), 1);
        assert!(tracker.comments_on("SM-6").is_empty());
        assert!(report.render().contains("SM-6**: needs manual assignment"));
        assert_eq!(report.actions_of(ActionType::Escalated).count(), 1);
    }

    #[tokio::test]
    async fn test_tracker_outage_still_reports_balance() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .seed_profiles(&[
                DeveloperProfile::new("a", "Ann", Specialization::Backend).with_workload(1),
                DeveloperProfile::new("b", "Ben", Specialization::Backend).with_workload(1),
                DeveloperProfile::new("c", "Cy", Specialization::Backend).with_workload(1),
                DeveloperProfile::new("d", "Dee", Specialization::Backend).with_workload(10),
            ])
            .unwrap();
        let broker = MessageBroker::new();
        let sprint = sprint();
        let tracker = Arc::new(InMemoryTracker::new().failing(TrackerOp::Search));
        let agent = ScrumMasterAgent::new(tracker).at(now());

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();
        let rendered = report.render();

        assert!(rendered.contains("not computed"));
        assert!(rendered.contains("move one task from Dee (10) to Ann (1)"));
        assert!(store.snapshot(42).unwrap().is_none());
        assert_eq!(report.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_sprint_dates() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(7, "Sprint 7");
        let tracker = Arc::new(InMemoryTracker::new());
        let agent = ScrumMasterAgent::new(tracker);

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert!(report.render().contains("Velocity risk: not computed"));
        assert!(store.snapshot(7).unwrap().is_some());
    }
}
