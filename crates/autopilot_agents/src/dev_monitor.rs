//! Developer assistant: watches assigned tickets for blockers and stalls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use autopilot_core::{Message, Ticket, Topic};

use crate::collaborators::{ActivitySource, Classifier, SentimentSignal, TicketQuery, TicketSource};
use crate::error::{AgentError, AgentResult};
use crate::roles::AgentRole;
use crate::traits::{ActionTaken, ActionType, AgentHandler, AgentIssue, AgentReport, RunContext};

/// Days of history the activity probe looks at by default.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 2;

/// Dev-monitor agent.
pub struct DevMonitorAgent {
    tracker: Arc<dyn TicketSource>,
    classifier: Arc<dyn Classifier>,
    activity: Option<Arc<dyn ActivitySource>>,
    lookback_days: u32,
}

impl DevMonitorAgent {
    pub fn new(tracker: Arc<dyn TicketSource>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            tracker,
            classifier,
            activity: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivitySource>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    async fn review_comments(&self, ctx: &RunContext<'_>, ticket: &Ticket, report: &mut AgentReport) {
        let comments = match self.tracker.fetch_comments(&ticket.key).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(ticket = %ticket.key, "Comments unavailable: {}", e);
                report.push_issue(AgentIssue::warning("comments", e.to_string()).for_ticket(&ticket.key));
                return;
            }
        };

        let Some(latest) = comments.last() else {
            report.push_line(format!("- **{}** ({}): no comments yet", ticket.key, ticket.summary));
            return;
        };
        if latest.body.trim().is_empty() {
            report.push_line(format!("- **{}** ({}): latest comment has no text content", ticket.key, ticket.summary));
            return;
        }

        let analysis = match self.classifier.classify_sentiment(&latest.body).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(ticket = %ticket.key, "Sentiment analysis failed: {}", e);
                report.push_issue(AgentIssue::warning("sentiment", e.to_string()).for_ticket(&ticket.key));
                return;
            }
        };

        report.push_line(format!(
            "- **{}** ({}): latest comment \"{}\"\n  {}",
            ticket.key,
            ticket.summary,
            latest.body.trim(),
            analysis.trim().replace('\n', "\n  ")
        ));

        match SentimentSignal::parse(&analysis) {
            Ok(signal) => {
                debug!(ticket = %ticket.key, blocked = signal.blocked, sentiment = signal.sentiment.as_str(), "Comment analyzed");
                if signal.blocked {
                    info!(ticket = %ticket.key, "Blocker detected");
                    ctx.broker.publish_message(
                        Message::new(
                            AgentRole::DevMonitor.as_str(),
                            format!("{} is blocked: {}", ticket.key, latest.body.trim()),
                        )
                        .on_topic(Topic::Blocker)
                        .about(&ticket.key),
                    );
                    report.record_action(
                        ActionTaken::new(ActionType::Signalled, "Published blocker signal").on(&ticket.key),
                    );
                }
            }
            Err(e) => {
                report.push_issue(AgentIssue::warning("sentiment", e.to_string()).for_ticket(&ticket.key));
            }
        }
    }

    /// Ask the activity source about one ticket. Sources may shell out, so
    /// the call runs on the blocking pool.
    async fn probe_activity(&self, ctx: &RunContext<'_>, ticket: &Ticket, report: &mut AgentReport) {
        let Some(activity) = self.activity.clone() else {
            return;
        };

        let key = ticket.key.clone();
        let lookback_days = self.lookback_days;
        let probed = tokio::task::spawn_blocking(move || activity.has_recent_activity(&key, lookback_days))
            .await
            .map_err(|e| AgentError::Activity(format!("activity probe did not complete: {}", e)))
            .and_then(|result| result);

        match probed {
            Ok(true) => {}
            Ok(false) => {
                info!(ticket = %ticket.key, lookback_days = self.lookback_days, "No recent activity");
                report.push_line(format!(
                    "  - No code activity on {} in the last {} day(s)",
                    ticket.key, self.lookback_days
                ));
                ctx.broker.publish_message(
                    Message::new(
                        AgentRole::DevMonitor.as_str(),
                        format!(
                            "No commits mention {} in the last {} day(s)",
                            ticket.key, self.lookback_days
                        ),
                    )
                    .on_topic(Topic::NoActivity)
                    .about(&ticket.key),
                );
                report.record_action(
                    ActionTaken::new(ActionType::Signalled, "Published no-activity signal").on(&ticket.key),
                );
            }
            Err(e) => {
                warn!(ticket = %ticket.key, "Activity probe failed: {}", e);
                report.push_issue(AgentIssue::warning("activity", e.to_string()).for_ticket(&ticket.key));
            }
        }
    }
}

#[async_trait]
impl AgentHandler for DevMonitorAgent {
    fn role(&self) -> AgentRole {
        AgentRole::DevMonitor
    }

    async fn process(&self, ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
        let tickets = self.tracker.search(TicketQuery::AssignedOpen).await?;
        info!(count = tickets.len(), "Assigned open tickets found");

        if tickets.is_empty() {
            return Ok(AgentReport::success(self.role(), "No open tickets assigned to you."));
        }

        let mut report = AgentReport::success(
            self.role(),
            format!("Monitoring {} assigned ticket(s).", tickets.len()),
        );
        for ticket in &tickets {
            self.review_comments(ctx, ticket, &mut report).await;
            self.probe_activity(ctx, ticket, &mut report).await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockActivitySource;
    use crate::mock::{InMemoryTracker, ScriptedClassifier};
    use autopilot_core::{Comment, KnowledgeStore, MessageBroker, SprintInfo, TicketStatus};

    fn in_progress(key: &str) -> Ticket {
        Ticket::new(key, format!("Work on {}", key), TicketStatus::InProgress).with_assignee("me")
    }

    #[tokio::test]
    async fn test_blocked_comment_publishes_blocker() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let tracker = Arc::new(
            InMemoryTracker::new()
                .with_tickets(TicketQuery::AssignedOpen, vec![in_progress("SM-4"), in_progress("SM-5")])
                .with_comments("SM-4", vec![Comment::new("Fine"), Comment::new("Waiting on the vendor API key")])
                .with_comments("SM-5", vec![Comment::new("Merged the first half")]),
        );
        let classifier = Arc::new(
            ScriptedClassifier::new()
                .with_sentiment("Waiting on the vendor API key", "Blocked: yes\nSentiment: negative")
                .with_sentiment("Merged the first half", "Blocked: no\nSentiment: positive"),
        );
        let agent = DevMonitorAgent::new(tracker, classifier);

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert!(report.issues.is_empty());
        assert_eq!(broker.len(), 1);
        let message = broker.subscribe().unwrap();
        assert_eq!(message.topic, Topic::Blocker);
        assert_eq!(message.ticket_key.as_deref(), Some("SM-4"));
        assert!(report.render().contains("Waiting on the vendor API key"));
    }

    #[tokio::test]
    async fn test_stalled_ticket_publishes_no_activity() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let tracker = Arc::new(
            InMemoryTracker::new().with_tickets(TicketQuery::AssignedOpen, vec![in_progress("SM-8")]),
        );

        let mut activity = MockActivitySource::new();
        activity
            .expect_has_recent_activity()
            .withf(|key, days| key == "SM-8" && *days == 3)
            .times(1)
            .returning(|_, _| Ok(false));

        let agent = DevMonitorAgent::new(tracker, Arc::new(ScriptedClassifier::new()))
            .with_activity(Arc::new(activity))
            .with_lookback_days(3);

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert!(report.render().contains("no comments yet"));
        let message = broker.subscribe().unwrap();
        assert_eq!(message.topic, Topic::NoActivity);
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_failed_activity_check_is_an_issue() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let tracker = Arc::new(
            InMemoryTracker::new().with_tickets(TicketQuery::AssignedOpen, vec![in_progress("SM-6")]),
        );

        let mut activity = MockActivitySource::new();
        activity
            .expect_has_recent_activity()
            .times(1)
            .returning(|_, _| Err(AgentError::Activity("not a git repository".into())));

        let agent = DevMonitorAgent::new(tracker, Arc::new(ScriptedClassifier::new()))
            .with_activity(Arc::new(activity));

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, "activity");
        assert!(report.issues[0].message.contains("not a git repository"));
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_analysis_is_an_issue() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(1, "Sprint 1");
        let tracker = Arc::new(
            InMemoryTracker::new()
                .with_tickets(TicketQuery::AssignedOpen, vec![in_progress("SM-9")])
                .with_comments("SM-9", vec![Comment::new("hmm")]),
        );
        let classifier = Arc::new(ScriptedClassifier::new().with_sentiment("hmm", "Hard to say."));
        let agent = DevMonitorAgent::new(tracker, classifier);

        let report = agent.process(&RunContext::new(&store, &broker, &sprint)).await.unwrap();

        assert_eq!(report.issues.len(), 1);
        assert!(broker.is_empty());
    }
}
