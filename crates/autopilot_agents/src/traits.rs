//! Core agent trait and report types.
//!
//! Every agent turns the state of the tracker into a markdown report. An
//! agent may fail as a whole (the orchestrator turns that into a failure
//! report), but a problem with one ticket only ever becomes an issue line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autopilot_core::{KnowledgeStore, MessageBroker, SprintInfo};

use crate::error::AgentResult;
use crate::roles::{AgentRole, BrokerAccess};

/// Shared handles an agent works with during one run.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub store: &'a KnowledgeStore,
    pub broker: &'a MessageBroker,
    pub sprint: &'a SprintInfo,
}

impl<'a> RunContext<'a> {
    pub fn new(store: &'a KnowledgeStore, broker: &'a MessageBroker, sprint: &'a SprintInfo) -> Self {
        Self {
            store,
            broker,
            sprint,
        }
    }
}

/// Output from an agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    /// The agent role that produced this report
    pub role: AgentRole,
    /// Whether the agent completed its pass
    pub success: bool,
    /// First line of the report
    pub summary: String,
    /// Markdown body lines
    pub lines: Vec<String>,
    /// Autonomous actions taken against the tracker or the store
    pub actions: Vec<ActionTaken>,
    /// Per-ticket problems that did not stop the pass
    pub issues: Vec<AgentIssue>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AgentReport {
    /// Create a new successful report.
    pub fn success(role: AgentRole, summary: impl Into<String>) -> Self {
        Self {
            role,
            success: true,
            summary: summary.into(),
            lines: Vec::new(),
            actions: Vec::new(),
            issues: Vec::new(),
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Create a failed report.
    pub fn failure(role: AgentRole, summary: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(role, summary)
        }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn push_issue(&mut self, issue: AgentIssue) {
        self.issues.push(issue);
    }

    pub fn record_action(&mut self, action: ActionTaken) {
        self.actions.push(action);
    }

    /// Set duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn actions_of(&self, action_type: ActionType) -> impl Iterator<Item = &ActionTaken> {
        self.actions.iter().filter(move |a| a.action_type == action_type)
    }

    /// Render as markdown.
    pub fn render(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.summary);

        for line in &self.lines {
            output.push('\n');
            output.push_str(line);
        }

        if !self.issues.is_empty() {
            output.push_str("\n\n**Issues:**");
            for issue in &self.issues {
                output.push('\n');
                output.push_str(&issue.render());
            }
        }

        output
    }
}

/// An action an agent performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTaken {
    pub action_type: ActionType,
    pub ticket_key: Option<String>,
    pub description: String,
}

impl ActionTaken {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        Self {
            action_type,
            ticket_key: None,
            description: description.into(),
        }
    }

    pub fn on(mut self, ticket_key: impl Into<String>) -> Self {
        self.ticket_key = Some(ticket_key.into());
        self
    }
}

/// Types of autonomous actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Priority and labels written to a ticket
    Classified,
    /// Ticket assigned to a developer
    Assigned,
    /// Comment posted on a ticket
    Commented,
    /// Ticket priority raised in response to a signal
    Escalated,
    /// Signal published to the broker
    Signalled,
    /// Snapshot written to the knowledge store
    Recorded,
}

/// A problem an agent hit while processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIssue {
    pub severity: IssueSeverity,
    pub category: String,
    pub message: String,
    pub ticket_key: Option<String>,
}

impl AgentIssue {
    /// Create an error issue.
    pub fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            category: category.into(),
            message: message.into(),
            ticket_key: None,
        }
    }

    /// Create a warning issue.
    pub fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            category: category.into(),
            message: message.into(),
            ticket_key: None,
        }
    }

    pub fn for_ticket(mut self, ticket_key: impl Into<String>) -> Self {
        self.ticket_key = Some(ticket_key.into());
        self
    }

    fn render(&self) -> String {
        let severity = match self.severity {
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
        };
        match &self.ticket_key {
            Some(key) => format!("- [{}] {} ({}): {}", severity, key, self.category, self.message),
            None => format!("- [{}] {}: {}", severity, self.category, self.message),
        }
    }
}

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// Core trait for all agents.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Get the role this agent handles.
    fn role(&self) -> AgentRole;

    /// How this agent uses the broker. Defaults to the role's declaration.
    fn broker_access(&self) -> BrokerAccess {
        self.role().broker_access()
    }

    /// Run one pass and produce a report.
    async fn process(&self, ctx: &RunContext<'_>) -> AgentResult<AgentReport>;
}
