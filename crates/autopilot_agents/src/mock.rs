//! In-memory collaborators for testing.
//!
//! Provides a ticket tracker, a scripted classifier and a recording
//! reporter so agents and whole runs can be exercised without Jira,
//! a language model or SMTP.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use autopilot_core::{Comment, Ticket};

use crate::collaborators::{
    Classifier, FieldUpdate, Reporter, TicketQuery, TicketSource, TriageClassification,
};
use crate::error::{AgentError, AgentResult};
use crate::orchestrator::RunReport;

/// Tracker operations, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    Search,
    FetchComments,
    UpdateFields,
    Assign,
    AddComment,
}

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    Search { query: TicketQuery },
    FetchComments { key: String },
    UpdateFields { key: String, update: FieldUpdate },
    Assign { key: String, developer_id: String },
    AddComment { key: String, text: String },
}

/// Mock ticket tracker.
///
/// Serves predefined search results and comments, records every call and
/// keeps posted comments so tests can read them back.
#[derive(Clone, Default)]
pub struct InMemoryTracker {
    results: Arc<RwLock<HashMap<TicketQuery, Vec<Ticket>>>>,
    comments: Arc<RwLock<HashMap<String, Vec<Comment>>>>,
    failing: Arc<RwLock<HashSet<TrackerOp>>>,
    captured_calls: Arc<RwLock<Vec<TrackerCall>>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets returned for a query. Unknown queries return nothing.
    pub fn with_tickets(self, query: TicketQuery, tickets: Vec<Ticket>) -> Self {
        self.results.write().insert(query, tickets);
        self
    }

    pub fn with_comments(self, key: impl Into<String>, comments: Vec<Comment>) -> Self {
        self.comments.write().insert(key.into(), comments);
        self
    }

    /// Make an operation fail from now on.
    pub fn failing(self, op: TrackerOp) -> Self {
        self.failing.write().insert(op);
        self
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.captured_calls.read().clone()
    }

    /// Comments posted through [`TicketSource::add_comment`].
    pub fn comments_on(&self, key: &str) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .filter_map(|call| match call {
                TrackerCall::AddComment { key: k, text } if k == key => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn capture(&self, op: TrackerOp, call: TrackerCall) -> AgentResult<()> {
        self.captured_calls.write().push(call);
        if self.failing.read().contains(&op) {
            return Err(AgentError::tracker(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketSource for InMemoryTracker {
    async fn search(&self, query: TicketQuery) -> AgentResult<Vec<Ticket>> {
        self.capture(TrackerOp::Search, TrackerCall::Search { query })?;
        Ok(self.results.read().get(&query).cloned().unwrap_or_default())
    }

    async fn fetch_comments(&self, ticket_key: &str) -> AgentResult<Vec<Comment>> {
        self.capture(
            TrackerOp::FetchComments,
            TrackerCall::FetchComments {
                key: ticket_key.to_string(),
            },
        )?;
        Ok(self.comments.read().get(ticket_key).cloned().unwrap_or_default())
    }

    async fn update_fields(&self, ticket_key: &str, update: &FieldUpdate) -> AgentResult<()> {
        self.capture(
            TrackerOp::UpdateFields,
            TrackerCall::UpdateFields {
                key: ticket_key.to_string(),
                update: update.clone(),
            },
        )
    }

    async fn assign(&self, ticket_key: &str, developer_id: &str) -> AgentResult<()> {
        self.capture(
            TrackerOp::Assign,
            TrackerCall::Assign {
                key: ticket_key.to_string(),
                developer_id: developer_id.to_string(),
            },
        )
    }

    async fn add_comment(&self, ticket_key: &str, text: &str) -> AgentResult<()> {
        self.capture(
            TrackerOp::AddComment,
            TrackerCall::AddComment {
                key: ticket_key.to_string(),
                text: text.to_string(),
            },
        )
    }
}

/// Default sentiment analysis for unscripted comments.
pub const NEUTRAL_ANALYSIS: &str = "Blocked: no\nSentiment: neutral";

/// Mock classifier returning raw model output by input text.
///
/// Triage output is keyed by ticket summary and goes through the same
/// parser as real model output.
#[derive(Clone, Default)]
pub struct ScriptedClassifier {
    triage: Arc<RwLock<HashMap<String, String>>>,
    sentiment: Arc<RwLock<HashMap<String, String>>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triage(self, summary: impl Into<String>, raw_output: impl Into<String>) -> Self {
        self.triage.write().insert(summary.into(), raw_output.into());
        self
    }

    pub fn with_sentiment(self, text: impl Into<String>, analysis: impl Into<String>) -> Self {
        self.sentiment.write().insert(text.into(), analysis.into());
        self
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify_triage(
        &self,
        summary: &str,
        _description: &str,
    ) -> AgentResult<TriageClassification> {
        let raw = self
            .triage
            .read()
            .get(summary)
            .cloned()
            .ok_or_else(|| AgentError::classifier(format!("no scripted output for '{}'", summary)))?;
        TriageClassification::parse(&raw)
    }

    async fn classify_sentiment(&self, text: &str) -> AgentResult<String> {
        Ok(self
            .sentiment
            .read()
            .get(text)
            .cloned()
            .unwrap_or_else(|| NEUTRAL_ANALYSIS.to_string()))
    }
}

/// Mock reporter that keeps every delivered run.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    sent: Arc<RwLock<Vec<RunReport>>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter whose deliveries always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<RunReport> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn send(&self, report: &RunReport) -> AgentResult<()> {
        self.sent.write().push(report.clone());
        if self.fail {
            return Err(AgentError::Notification("injected delivery failure".to_string()));
        }
        Ok(())
    }
}
