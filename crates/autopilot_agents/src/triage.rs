//! Triage agent: classifies unassigned tickets and routes them to developers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use autopilot_core::{AssigneeMatch, AssignmentEngine, AssignmentOutcome, Message, Ticket, Topic};

use crate::collaborators::{Classifier, FieldUpdate, TicketQuery, TicketSource, TriageClassification};
use crate::error::AgentResult;
use crate::roles::AgentRole;
use crate::traits::{ActionTaken, ActionType, AgentHandler, AgentIssue, AgentReport, RunContext};

/// Triage agent.
pub struct TriageAgent {
    tracker: Arc<dyn TicketSource>,
    classifier: Arc<dyn Classifier>,
}

impl TriageAgent {
    pub fn new(tracker: Arc<dyn TicketSource>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            tracker,
            classifier,
        }
    }

    /// Classify, label, assign and comment on one ticket.
    ///
    /// Every failure ends up in the report; none leaves this function.
    #[instrument(skip_all, fields(ticket = %ticket.key))]
    async fn triage_ticket(&self, ctx: &RunContext<'_>, ticket: &Ticket, report: &mut AgentReport) {
        let classification = match self
            .classifier
            .classify_triage(&ticket.summary, &ticket.description)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!("Classification skipped: {}", e);
                report.push_line(format!("- **{}**: skipped, classification failed", ticket.key));
                report.push_issue(AgentIssue::warning("classification", e.to_string()).for_ticket(&ticket.key));
                return;
            }
        };
        debug!(
            specialization = %classification.specialization,
            priority = %classification.priority,
            issue_type = %classification.issue_type,
            "Ticket classified"
        );

        self.apply_classification(ticket, &classification, report).await;

        let engine = AssignmentEngine::new(ctx.store);
        let choice = match engine.select(classification.specialization) {
            Ok(choice) => choice,
            Err(e) => {
                warn!("Assignee lookup failed: {}", e);
                report.push_line(format!(
                    "- **{}**: classified as **{}** (priority **{}**), assignee lookup failed",
                    ticket.key, classification.specialization, classification.priority
                ));
                report.push_issue(AgentIssue::error("storage", e.to_string()).for_ticket(&ticket.key));
                return;
            }
        };

        let developer = match &choice {
            AssigneeMatch::Matched(profile) | AssigneeMatch::FallbackMatched { profile, .. } => profile.clone(),
            AssigneeMatch::NoneAvailable { requested } => {
                info!(specialization = %requested, "No developer available");
                report.push_line(format!(
                    "- **{}**: classified as **{}** (priority **{}**), no qualified developer available",
                    ticket.key, requested, classification.priority
                ));
                let message = Message::new(
                    AgentRole::Triage.as_str(),
                    format!("{} needs a {} developer but none is registered", ticket.key, requested),
                )
                .on_topic(Topic::Unassignable)
                .about(&ticket.key);
                ctx.broker.publish_message(message);
                report.record_action(
                    ActionTaken::new(ActionType::Signalled, "Published unassignable signal").on(&ticket.key),
                );
                return;
            }
        };

        if let Err(e) = self.tracker.assign(&ticket.key, &developer.developer_id).await {
            warn!(developer_id = %developer.developer_id, "Assignment rejected by tracker: {}", e);
            report.push_line(format!(
                "- **{}**: classified as **{}** (priority **{}**), assignment to {} failed",
                ticket.key, classification.specialization, classification.priority, developer.name
            ));
            report.push_issue(AgentIssue::error("assignment", e.to_string()).for_ticket(&ticket.key));
            return;
        }

        let fallback_note = if choice.is_fallback() { " via FullStack fallback" } else { "" };
        match engine.record(&choice) {
            AssignmentOutcome::Assigned {
                developer,
                previous_workload,
                new_workload,
                ..
            } => {
                report.push_line(format!(
                    "- **{}**: classified as **{}** (priority **{}**), assigned to **{}**{} (workload {} -> {})",
                    ticket.key,
                    classification.specialization,
                    classification.priority,
                    developer.name,
                    fallback_note,
                    previous_workload,
                    new_workload
                ));
                report.record_action(
                    ActionTaken::new(ActionType::Assigned, format!("Assigned to {}", developer.developer_id))
                        .on(&ticket.key),
                );
            }
            AssignmentOutcome::WorkloadNotRecorded { developer, .. } => {
                report.push_line(format!(
                    "- **{}**: classified as **{}** (priority **{}**), assignment failed: workload not recorded for {}",
                    ticket.key, classification.specialization, classification.priority, developer.name
                ));
                report.push_issue(
                    AgentIssue::error("storage", format!("workload update failed for {}", developer.developer_id))
                        .for_ticket(&ticket.key),
                );
                return;
            }
            AssignmentOutcome::Unassignable { .. } => return,
        }

        let comment = format!(
            "Triage Agent: assigned to {} as a {} ticket with predicted priority {}.",
            developer.name, classification.specialization, classification.priority
        );
        match self.tracker.add_comment(&ticket.key, &comment).await {
            Ok(()) => report.record_action(ActionTaken::new(ActionType::Commented, comment).on(&ticket.key)),
            Err(e) => {
                warn!("Triage comment not posted: {}", e);
                report.push_issue(AgentIssue::warning("comment", e.to_string()).for_ticket(&ticket.key));
            }
        }
    }

    /// Write priority and the specialization label. A failure here does not
    /// stop the assignment.
    async fn apply_classification(
        &self,
        ticket: &Ticket,
        classification: &TriageClassification,
        report: &mut AgentReport,
    ) {
        let update = FieldUpdate::priority(classification.priority)
            .with_labels(vec![classification.specialization.as_str().to_string()]);

        match self.tracker.update_fields(&ticket.key, &update).await {
            Ok(()) => report.record_action(
                ActionTaken::new(
                    ActionType::Classified,
                    format!(
                        "Priority {}, label {}",
                        classification.priority, classification.specialization
                    ),
                )
                .on(&ticket.key),
            ),
            Err(e) => {
                warn!("Field update failed: {}", e);
                report.push_issue(AgentIssue::warning("update", e.to_string()).for_ticket(&ticket.key));
            }
        }
    }
}

#[async_trait]
impl AgentHandler for TriageAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Triage
    }

    async fn process(&self, ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
        let tickets = self.tracker.search(TicketQuery::Untriaged).await?;
        info!(count = tickets.len(), "Untriaged tickets found");

        if tickets.is_empty() {
            return Ok(AgentReport::success(self.role(), "No untriaged tickets found."));
        }

        let mut report = AgentReport::success(
            self.role(),
            format!("Found {} untriaged ticket(s).", tickets.len()),
        );
        for ticket in &tickets {
            self.triage_ticket(ctx, ticket, &mut report).await;
        }

        let assigned = report.actions_of(ActionType::Assigned).count();
        report.push_line(format!("Assigned {} of {} ticket(s).", assigned, tickets.len()));
        Ok(report)
    }
}
