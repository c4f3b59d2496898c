//! QA & release agent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collaborators::{TicketQuery, TicketSource};
use crate::error::AgentResult;
use crate::roles::AgentRole;
use crate::traits::{AgentHandler, AgentReport, RunContext};

/// Lists tickets waiting for review. Read-only.
pub struct QaReleaseAgent {
    tracker: Arc<dyn TicketSource>,
}

impl QaReleaseAgent {
    pub fn new(tracker: Arc<dyn TicketSource>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl AgentHandler for QaReleaseAgent {
    fn role(&self) -> AgentRole {
        AgentRole::QaRelease
    }

    async fn process(&self, _ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
        let tickets = self.tracker.search(TicketQuery::InReview).await?;
        info!(count = tickets.len(), "Tickets in review");

        if tickets.is_empty() {
            return Ok(AgentReport::success(self.role(), "No tickets are waiting for review."));
        }

        let mut report = AgentReport::success(
            self.role(),
            format!("{} ticket(s) ready for QA review:", tickets.len()),
        );
        for ticket in &tickets {
            let assignee = ticket.assignee.as_deref().unwrap_or("unassigned");
            report.push_line(format!("- **{}**: {} ({})", ticket.key, ticket.summary, assignee));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryTracker, TrackerCall};
    use autopilot_core::{KnowledgeStore, MessageBroker, SprintInfo, Ticket, TicketStatus};

    #[tokio::test]
    async fn test_lists_review_queue_without_writes() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let tracker = Arc::new(InMemoryTracker::new().with_tickets(
            TicketQuery::InReview,
            vec![
                Ticket::new("SM-2", "Login page", TicketStatus::InReview).with_assignee("Fay"),
                Ticket::new("SM-6", "Cache layer", TicketStatus::InReview),
            ],
        ));
        let agent = QaReleaseAgent::new(tracker.clone());

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert_eq!(report.lines.len(), 2);
        assert!(report.lines[0].contains("Fay"));
        assert!(report.lines[1].contains("unassigned"));
        assert_eq!(
            tracker.calls(),
            vec![TrackerCall::Search {
                query: TicketQuery::InReview
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_review_queue() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let agent = QaReleaseAgent::new(Arc::new(InMemoryTracker::new()));

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();
        assert_eq!(report.summary, "No tickets are waiting for review.");
    }
}
