//! Domain models shared by the store, the engines and the agents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Area of expertise a developer is routed work for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Specialization {
    Frontend,
    Backend,
    DevOps,
    FullStack,
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialization::Frontend => "Frontend",
            Specialization::Backend => "Backend",
            Specialization::DevOps => "DevOps",
            Specialization::FullStack => "FullStack",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Specialization::Frontend,
            Specialization::Backend,
            Specialization::DevOps,
            Specialization::FullStack,
        ]
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Specialization {
    type Err = CoreError;

    /// Accepts the canonical names case-insensitively, ignoring spaces,
    /// hyphens and underscores ("Full Stack", "full-stack", "devops").
    fn from_str(s: &str) -> CoreResult<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "frontend" => Ok(Specialization::Frontend),
            "backend" => Ok(Specialization::Backend),
            "devops" => Ok(Specialization::DevOps),
            "fullstack" => Ok(Specialization::FullStack),
            _ => Err(CoreError::parse(format!("unknown specialization '{}'", s))),
        }
    }
}

/// Ticket priority, using the tracker's priority names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "Highest",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Lowest => "Lowest",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "highest" | "critical" | "blocker" => Ok(Priority::Highest),
            "high" => Ok(Priority::High),
            "medium" | "normal" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "lowest" | "trivial" => Ok(Priority::Lowest),
            _ => Err(CoreError::parse(format!("unknown priority '{}'", s))),
        }
    }
}

/// A developer known to the knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperProfile {
    /// Tracker account id, unique.
    pub developer_id: String,
    pub name: String,
    pub specialization: Specialization,
    /// Count of assigned, unresolved tickets.
    pub current_workload: u32,
}

impl DeveloperProfile {
    pub fn new(
        developer_id: impl Into<String>,
        name: impl Into<String>,
        specialization: Specialization,
    ) -> Self {
        Self {
            developer_id: developer_id.into(),
            name: name.into(),
            specialization,
            current_workload: 0,
        }
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.current_workload = workload;
        self
    }
}

/// One row of sprint history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintSnapshot {
    pub sprint_id: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub completed_count: u32,
    /// Average velocity the sprint was measured against, if known.
    pub team_velocity: Option<f64>,
}

impl SprintSnapshot {
    pub fn new(sprint_id: i64, end_date: NaiveDate, completed_count: u32) -> Self {
        Self {
            sprint_id,
            start_date: None,
            end_date,
            completed_count,
            team_velocity: None,
        }
    }

    pub fn with_start(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.team_velocity = Some(velocity);
        self
    }
}

/// Workflow status of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    ToDo,
    InProgress,
    InReview,
    Done,
    Other(String),
}

impl TicketStatus {
    /// Map a tracker status name onto a known status.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "to do" | "todo" => TicketStatus::ToDo,
            "in progress" => TicketStatus::InProgress,
            "in review" => TicketStatus::InReview,
            "done" => TicketStatus::Done,
            _ => TicketStatus::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TicketStatus::ToDo => "To Do",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::InReview => "In Review",
            TicketStatus::Done => "Done",
            TicketStatus::Other(name) => name,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TicketStatus::Done)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A ticket as read from the tracker. Never owned or mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub status: TicketStatus,
    /// Raw creation timestamp as reported by the tracker.
    pub created: Option<String>,
    pub description: String,
    pub assignee: Option<String>,
}

impl Ticket {
    pub fn new(key: impl Into<String>, summary: impl Into<String>, status: TicketStatus) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            status,
            created: None,
            description: String::new(),
            assignee: None,
        }
    }

    pub fn with_created(mut self, created: impl Into<String>) -> Self {
        self.created = Some(created.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Parse the creation timestamp.
    pub fn created_at(&self) -> CoreResult<DateTime<Utc>> {
        match &self.created {
            Some(raw) => parse_timestamp(raw),
            None => Err(CoreError::parse(format!("{} has no creation timestamp", self.key))),
        }
    }
}

/// A ticket comment, already flattened to plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<String>,
    pub body: String,
    pub created: Option<String>,
}

impl Comment {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            author: None,
            body: body.into(),
            created: None,
        }
    }
}

/// The sprint a run operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintInfo {
    pub id: i64,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl SprintInfo {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_dates(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }
}

/// Parse a tracker timestamp.
///
/// Accepts RFC 3339 (`2024-01-01T09:00:00.000Z`), the tracker's offset form
/// without a colon (`2024-01-02T10:15:30.000+0000`) and bare dates, which are
/// read as midnight UTC.
pub fn parse_timestamp(raw: &str) -> CoreResult<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(CoreError::parse(format!("unparseable timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_specialization_parsing() {
        assert_eq!("Frontend".parse::<Specialization>().unwrap(), Specialization::Frontend);
        assert_eq!("full stack".parse::<Specialization>().unwrap(), Specialization::FullStack);
        assert_eq!("Dev-Ops".parse::<Specialization>().unwrap(), Specialization::DevOps);
        assert!("Designer".parse::<Specialization>().is_err());
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("Critical".parse::<Priority>().unwrap(), Priority::Highest);
        assert!("urgent-ish".parse::<Priority>().is_err());
    }

    #[test]
    fn test_ticket_status_mapping() {
        assert_eq!(TicketStatus::from_name("DONE"), TicketStatus::Done);
        assert_eq!(TicketStatus::from_name("In Review"), TicketStatus::InReview);
        assert_eq!(
            TicketStatus::from_name("Blocked"),
            TicketStatus::Other("Blocked".to_string())
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let jira = parse_timestamp("2024-01-02T10:15:30.000+0000").unwrap();
        assert_eq!(jira.day(), 2);
        assert_eq!(jira.hour(), 10);

        let rfc = parse_timestamp("2024-01-01T09:00:00.000Z").unwrap();
        assert_eq!(rfc.hour(), 9);

        let offset = parse_timestamp("2024-01-02T10:00:00.000+0200").unwrap();
        assert_eq!(offset.hour(), 8);

        let date = parse_timestamp("2023-12-31").unwrap();
        assert_eq!(date.year(), 2023);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_ticket_without_created_is_parse_error() {
        let ticket = Ticket::new("SM-1", "No date", TicketStatus::ToDo);
        assert!(matches!(ticket.created_at(), Err(CoreError::Parse(_))));
    }
}
