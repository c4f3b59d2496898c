//! Narrow interfaces to the systems agents talk to.
//!
//! The tracker, the language model, the activity probe and report delivery
//! all live behind these traits. Concrete implementations are in
//! `autopilot_services`; in-memory doubles are in [`crate::mock`].

use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use autopilot_core::{Comment, Priority, Specialization, Ticket};

use crate::error::{AgentError, AgentResult};
use crate::orchestrator::RunReport;

/// Ticket selections the agents ask the tracker for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketQuery {
    /// "To Do" tickets nobody is assigned to.
    Untriaged,
    /// Open tickets assigned to the authenticated user.
    AssignedOpen,
    /// Tickets waiting for review.
    InReview,
    /// Every ticket in a sprint.
    Sprint(i64),
}

impl fmt::Display for TicketQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketQuery::Untriaged => write!(f, "untriaged"),
            TicketQuery::AssignedOpen => write!(f, "assigned-open"),
            TicketQuery::InReview => write!(f, "in-review"),
            TicketQuery::Sprint(id) => write!(f, "sprint-{}", id),
        }
    }
}

/// Field changes written to a ticket. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub priority: Option<Priority>,
    pub labels: Option<Vec<String>>,
}

impl FieldUpdate {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            labels: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.labels.is_none()
    }
}

/// Read and write access to the ticket tracker.
#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn search(&self, query: TicketQuery) -> AgentResult<Vec<Ticket>>;

    /// Comments on a ticket, oldest first.
    async fn fetch_comments(&self, ticket_key: &str) -> AgentResult<Vec<Comment>>;

    async fn update_fields(&self, ticket_key: &str, update: &FieldUpdate) -> AgentResult<()>;

    async fn assign(&self, ticket_key: &str, developer_id: &str) -> AgentResult<()>;

    async fn add_comment(&self, ticket_key: &str, text: &str) -> AgentResult<()>;
}

/// The language model, seen as an opaque text classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a new ticket. Malformed model output is an [`AgentError::Parse`].
    async fn classify_triage(
        &self,
        summary: &str,
        description: &str,
    ) -> AgentResult<TriageClassification>;

    /// Free-text analysis of a comment, expected to contain a
    /// `blocked: yes/no` and a `sentiment: ...` line.
    async fn classify_sentiment(&self, text: &str) -> AgentResult<String>;
}

/// Delivers the aggregated run report.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn send(&self, report: &RunReport) -> AgentResult<()>;
}

/// Recent code activity on a ticket.
#[cfg_attr(test, mockall::automock)]
pub trait ActivitySource: Send + Sync {
    fn has_recent_activity(&self, ticket_key: &str, lookback_days: u32) -> AgentResult<bool>;
}

/// Structured triage result. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageClassification {
    pub issue_type: String,
    pub priority: Priority,
    pub specialization: Specialization,
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(alias = "issueType", alias = "type")]
    issue_type: String,
    priority: String,
    specialization: String,
}

impl TriageClassification {
    /// Parse model output.
    ///
    /// Tolerates markdown code fences and prose around a single JSON object.
    pub fn parse(raw: &str) -> AgentResult<Self> {
        let body = extract_json_object(raw)
            .ok_or_else(|| AgentError::parse(format!("no JSON object in classifier output: {}", truncate(raw))))?;

        let parsed: RawClassification = serde_json::from_str(body)
            .map_err(|e| AgentError::parse(format!("malformed classification: {}", e)))?;

        let priority = parsed
            .priority
            .parse::<Priority>()
            .map_err(|e| AgentError::parse(e.to_string()))?;
        let specialization = parsed
            .specialization
            .parse::<Specialization>()
            .map_err(|e| AgentError::parse(e.to_string()))?;

        if parsed.issue_type.trim().is_empty() {
            return Err(AgentError::parse("classification has an empty issue type"));
        }

        Ok(Self {
            issue_type: parsed.issue_type.trim().to_string(),
            priority,
            specialization,
        })
    }
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn truncate(raw: &str) -> String {
    raw.chars().take(80).collect()
}

/// Mood of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }
}

/// Signals pulled out of a sentiment analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub blocked: bool,
    pub sentiment: Sentiment,
}

impl SentimentSignal {
    /// Find the `blocked` and `sentiment` markers, case-insensitively and
    /// through markdown emphasis (`**Blocked:** Yes`).
    pub fn parse(analysis: &str) -> AgentResult<Self> {
        let blocked_re = Regex::new(r"(?i)blocked[^a-z]*\b(yes|no)\b")
            .map_err(|e| AgentError::parse(e.to_string()))?;
        let sentiment_re = Regex::new(r"(?i)sentiment[^a-z]*\b(negative|neutral|positive)\b")
            .map_err(|e| AgentError::parse(e.to_string()))?;

        let blocked = blocked_re
            .captures(analysis)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().eq_ignore_ascii_case("yes"))
            .ok_or_else(|| AgentError::parse("analysis has no blocked marker"))?;

        let sentiment = match sentiment_re
            .captures(analysis)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .as_deref()
        {
            Some("negative") => Sentiment::Negative,
            Some("positive") => Sentiment::Positive,
            Some(_) => Sentiment::Neutral,
            None => return Err(AgentError::parse("analysis has no sentiment marker")),
        };

        Ok(Self { blocked, sentiment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_classification() {
        let raw = "```json\n{\"issueType\": \"Bug\", \"priority\": \"High\", \"specialization\": \"Frontend\"}\n```";
        let parsed = TriageClassification::parse(raw).unwrap();
        assert_eq!(parsed.issue_type, "Bug");
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.specialization, Specialization::Frontend);
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let raw = r#"{"issue_type": "Task", "priority": "Low"}"#;
        assert!(matches!(TriageClassification::parse(raw), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_specialization() {
        let raw = r#"{"issue_type": "Task", "priority": "Low", "specialization": "Data"}"#;
        assert!(matches!(TriageClassification::parse(raw), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(TriageClassification::parse("I think this is a backend bug.").is_err());
    }

    #[test]
    fn test_sentiment_markers() {
        let signal = SentimentSignal::parse("**Blocked:** Yes\n**Sentiment:** Negative").unwrap();
        assert!(signal.blocked);
        assert_eq!(signal.sentiment, Sentiment::Negative);

        let signal = SentimentSignal::parse("blocked: no, sentiment: positive").unwrap();
        assert!(!signal.blocked);
        assert_eq!(signal.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_sentiment_without_markers() {
        assert!(SentimentSignal::parse("Looks fine to me").is_err());
    }

    #[test]
    fn test_field_update() {
        let update = FieldUpdate::priority(Priority::High).with_labels(vec!["Backend".into()]);
        assert!(!update.is_empty());
        assert!(FieldUpdate::default().is_empty());
    }
}
