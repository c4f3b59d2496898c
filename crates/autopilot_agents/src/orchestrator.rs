//! Run pipeline: executes the agents in their fixed order and aggregates
//! the reports.
//!
//! Each stage declares how it uses the broker. A pipeline is rejected at
//! construction when a publisher would run after the drainer, so signals
//! cannot be silently lost to ordering.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use autopilot_core::{Message, SprintInfo};

use crate::collaborators::Reporter;
use crate::error::{AgentError, AgentResult};
use crate::roles::{AgentRole, BrokerAccess};
use crate::traits::{AgentHandler, AgentReport, RunContext};

/// States of one run. Transitions are unconditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Triaging,
    Monitoring,
    ReleaseCheck,
    HealthCheck,
    Reporting,
    Done,
}

impl RunState {
    pub fn next(&self) -> Option<RunState> {
        use RunState::*;
        match self {
            Idle => Some(Triaging),
            Triaging => Some(Monitoring),
            Monitoring => Some(ReleaseCheck),
            ReleaseCheck => Some(HealthCheck),
            HealthCheck => Some(Reporting),
            Reporting => Some(Done),
            Done => None,
        }
    }

    /// Agent that runs in this state, if any.
    pub fn role(&self) -> Option<AgentRole> {
        match self {
            RunState::Triaging => Some(AgentRole::Triage),
            RunState::Monitoring => Some(AgentRole::DevMonitor),
            RunState::ReleaseCheck => Some(AgentRole::QaRelease),
            RunState::HealthCheck => Some(AgentRole::ScrumMaster),
            RunState::Idle | RunState::Reporting | RunState::Done => None,
        }
    }
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sprint: SprintInfo,
    pub generated_at: DateTime<Utc>,
    /// One report per executed stage, in run order.
    pub reports: Vec<AgentReport>,
    /// Messages nobody drained.
    pub undelivered: Vec<Message>,
}

impl RunReport {
    fn new(sprint: &SprintInfo) -> Self {
        Self {
            sprint: sprint.clone(),
            generated_at: Utc::now(),
            reports: Vec::new(),
            undelivered: Vec::new(),
        }
    }

    /// Markdown text keyed by agent display name, in run order.
    pub fn by_agent(&self) -> Vec<(String, String)> {
        self.reports
            .iter()
            .map(|r| (r.role.display_name().to_string(), r.render()))
            .collect()
    }

    pub fn report_for(&self, role: AgentRole) -> Option<&AgentReport> {
        self.reports.iter().find(|r| r.role == role)
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.success)
    }

    /// Render the whole run as one markdown document.
    pub fn render_markdown(&self) -> String {
        let mut output = format!(
            "# Sprint Autopilot Report: {}\n\nGenerated {}\n",
            self.sprint.name,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        for (name, body) in self.by_agent() {
            output.push_str(&format!("\n## {}\n\n{}\n", name, body));
        }

        if !self.undelivered.is_empty() {
            output.push_str(&format!("\n## Undelivered signals ({})\n\n", self.undelivered.len()));
            for message in &self.undelivered {
                output.push_str(&format!("- [{}] {}: {}\n", message.topic, message.sender, message.content));
            }
        }

        output
    }
}

/// Sequential agent pipeline.
pub struct Orchestrator {
    stages: Vec<Arc<dyn AgentHandler>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl Orchestrator {
    /// Build a pipeline, checking stage order and broker dependencies.
    pub fn new(stages: Vec<Arc<dyn AgentHandler>>) -> AgentResult<Self> {
        let mut drainer: Option<AgentRole> = None;

        for pair in stages.windows(2) {
            if pair[0].role() >= pair[1].role() {
                return Err(AgentError::InvalidPipeline(format!(
                    "{} cannot run after {}",
                    pair[1].role(),
                    pair[0].role()
                )));
            }
        }

        for stage in &stages {
            match (stage.broker_access(), drainer) {
                (BrokerAccess::Drains, Some(existing)) => {
                    return Err(AgentError::InvalidPipeline(format!(
                        "{} and {} both drain the broker",
                        existing,
                        stage.role()
                    )));
                }
                (BrokerAccess::Drains, None) => drainer = Some(stage.role()),
                (BrokerAccess::Publishes, Some(existing)) => {
                    return Err(AgentError::InvalidPipeline(format!(
                        "{} publishes after {} has drained the broker",
                        stage.role(),
                        existing
                    )));
                }
                _ => {}
            }
        }

        debug!(stages = stages.len(), "Pipeline validated");
        Ok(Self {
            stages,
            reporter: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.stages.iter().map(|s| s.role()).collect()
    }

    /// Run every stage once. Always reaches [`RunState::Done`].
    pub async fn run(&self, ctx: &RunContext<'_>) -> RunReport {
        let mut report = RunReport::new(ctx.sprint);
        let mut state = RunState::Idle;
        info!(sprint_id = ctx.sprint.id, sprint = %ctx.sprint.name, "Run started");

        while let Some(next) = state.next() {
            debug!(from = ?state, to = ?next, "Run state transition");
            state = next;

            if let Some(role) = state.role() {
                if let Some(stage) = self.stages.iter().find(|s| s.role() == role) {
                    report.reports.push(self.run_stage(stage.as_ref(), ctx).await);
                }
            }

            if state == RunState::Reporting {
                report.undelivered = ctx.broker.drain();
                for message in &report.undelivered {
                    warn!(sender = %message.sender, topic = %message.topic, "Undelivered message: {}", message.content);
                }
                report.generated_at = Utc::now();
                self.deliver(&report).await;
            }
        }

        info!(
            agents = report.reports.len(),
            undelivered = report.undelivered.len(),
            "Run finished"
        );
        report
    }

    async fn run_stage(&self, stage: &dyn AgentHandler, ctx: &RunContext<'_>) -> AgentReport {
        let role = stage.role();
        info!(agent = %role, "Agent started");
        let started = Instant::now();

        let report = match stage.process(ctx).await {
            Ok(report) => report,
            Err(e) => {
                error!(agent = %role, "Agent failed: {}", e);
                AgentReport::failure(role, format!("Agent failed: {}", e))
            }
        };

        let elapsed = started.elapsed().as_millis() as u64;
        info!(agent = %role, success = report.success, duration_ms = elapsed, "Agent finished");
        report.with_duration(elapsed)
    }

    async fn deliver(&self, report: &RunReport) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        if let Err(e) = reporter.send(report).await {
            warn!("Report delivery failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryTracker, RecordingReporter, ScriptedClassifier};
    use crate::{DevMonitorAgent, QaReleaseAgent, ScrumMasterAgent, TriageAgent};
    use async_trait::async_trait;
    use autopilot_core::{KnowledgeStore, MessageBroker, Topic};

    struct FailingAgent(AgentRole);

    #[async_trait]
    impl AgentHandler for FailingAgent {
        fn role(&self) -> AgentRole {
            self.0
        }

        async fn process(&self, _ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
            Err(AgentError::execution_failed(self.0.as_str(), "tracker timed out"))
        }
    }

    struct Publisher(AgentRole);

    #[async_trait]
    impl AgentHandler for Publisher {
        fn role(&self) -> AgentRole {
            self.0
        }

        fn broker_access(&self) -> BrokerAccess {
            BrokerAccess::Publishes
        }

        async fn process(&self, ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
            ctx.broker.publish_message(Message::new(self.0.as_str(), "late news").on_topic(Topic::General));
            Ok(AgentReport::success(self.0, "published"))
        }
    }

    #[test]
    fn test_state_sequence() {
        let mut states = vec![RunState::Idle];
        while let Some(next) = states.last().and_then(|s| s.next()) {
            states.push(next);
        }
        assert_eq!(states.len(), 7);
        assert_eq!(states.last(), Some(&RunState::Done));
        let roles: Vec<_> = states.iter().filter_map(|s| s.role()).collect();
        assert_eq!(roles, AgentRole::all());
    }

    #[test]
    fn test_rejects_out_of_order_stages() {
        let tracker = Arc::new(InMemoryTracker::new());
        let stages: Vec<Arc<dyn AgentHandler>> = vec![
            Arc::new(ScrumMasterAgent::new(tracker.clone())),
            Arc::new(QaReleaseAgent::new(tracker)),
        ];
        assert!(matches!(Orchestrator::new(stages), Err(AgentError::InvalidPipeline(_))));
    }

    #[test]
    fn test_accepts_canonical_pipeline() {
        let tracker = Arc::new(InMemoryTracker::new());
        let classifier = Arc::new(ScriptedClassifier::new());
        let stages: Vec<Arc<dyn AgentHandler>> = vec![
            Arc::new(TriageAgent::new(tracker.clone(), classifier.clone())),
            Arc::new(DevMonitorAgent::new(tracker.clone(), classifier)),
            Arc::new(QaReleaseAgent::new(tracker.clone())),
            Arc::new(ScrumMasterAgent::new(tracker)),
        ];
        assert_eq!(Orchestrator::new(stages).unwrap().roles(), AgentRole::all());
    }

    #[test]
    fn test_rejects_publisher_after_drainer() {
        struct EarlyDrainer;

        #[async_trait]
        impl AgentHandler for EarlyDrainer {
            fn role(&self) -> AgentRole {
                AgentRole::DevMonitor
            }

            fn broker_access(&self) -> BrokerAccess {
                BrokerAccess::Drains
            }

            async fn process(&self, _ctx: &RunContext<'_>) -> AgentResult<AgentReport> {
                Ok(AgentReport::success(AgentRole::DevMonitor, "drained"))
            }
        }

        let stages: Vec<Arc<dyn AgentHandler>> = vec![
            Arc::new(EarlyDrainer),
            Arc::new(Publisher(AgentRole::QaRelease)),
        ];
        let err = Orchestrator::new(stages).err().unwrap();
        assert!(err.to_string().contains("publishes after"));
    }

    #[tokio::test]
    async fn test_failed_agent_becomes_report_and_run_completes() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(3, "Sprint 3");
        let reporter = Arc::new(RecordingReporter::new());
        let tracker = Arc::new(InMemoryTracker::new());

        let stages: Vec<Arc<dyn AgentHandler>> = vec![
            Arc::new(FailingAgent(AgentRole::Triage)),
            Arc::new(QaReleaseAgent::new(tracker)),
        ];
        let orchestrator = Orchestrator::new(stages).unwrap().with_reporter(reporter.clone());

        let run = orchestrator.run(&RunContext::new(&store, &broker, &sprint)).await;

        assert_eq!(run.reports.len(), 2);
        assert!(!run.reports[0].success);
        assert!(run.reports[0].summary.contains("tracker timed out"));
        assert!(run.reports[1].success);
        assert!(!run.all_succeeded());
        assert_eq!(reporter.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_undrained_messages_are_reported() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(3, "Sprint 3");

        let stages: Vec<Arc<dyn AgentHandler>> = vec![Arc::new(Publisher(AgentRole::DevMonitor))];
        let run = Orchestrator::new(stages)
            .unwrap()
            .run(&RunContext::new(&store, &broker, &sprint))
            .await;

        assert_eq!(run.undelivered.len(), 1);
        assert!(broker.is_empty());
        assert!(run.render_markdown().contains("Undelivered signals (1)"));
    }
}
