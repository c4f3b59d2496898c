//! Agent role definitions.

use serde::{Deserialize, Serialize};

/// Sprint agent roles, in the order a run executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Triage,
    DevMonitor,
    QaRelease,
    ScrumMaster,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Triage => "triage",
            AgentRole::DevMonitor => "dev_monitor",
            AgentRole::QaRelease => "qa_release",
            AgentRole::ScrumMaster => "scrum_master",
        }
    }

    /// Heading used in the delivered report.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Triage => "Triage Agent",
            AgentRole::DevMonitor => "Developer Assistant Agent",
            AgentRole::QaRelease => "QA & Release Agent",
            AgentRole::ScrumMaster => "Scrum Master Agent",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentRole::Triage => "Classifies new tickets and assigns them to developers",
            AgentRole::DevMonitor => "Watches assigned tickets for blockers and stalled work",
            AgentRole::QaRelease => "Lists tickets waiting for review",
            AgentRole::ScrumMaster => "Tracks sprint health and escalates agent signals",
        }
    }

    /// How the role uses the run's message broker.
    pub fn broker_access(&self) -> BrokerAccess {
        match self {
            AgentRole::Triage | AgentRole::DevMonitor => BrokerAccess::Publishes,
            AgentRole::QaRelease => BrokerAccess::None,
            AgentRole::ScrumMaster => BrokerAccess::Drains,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            AgentRole::Triage,
            AgentRole::DevMonitor,
            AgentRole::QaRelease,
            AgentRole::ScrumMaster,
        ]
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared broker dependency of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerAccess {
    None,
    Publishes,
    Drains,
}
