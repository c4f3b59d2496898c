//! # autopilot_agents
//!
//! Sprint agents and the run pipeline that sequences them.
//!
//! ## Architecture
//!
//! All agents implement the [`AgentHandler`] trait and talk to the outside
//! world only through the collaborator traits in [`collaborators`]. The
//! [`Orchestrator`] runs them in a fixed order against one
//! [`RunContext`] (knowledge store, message broker, sprint).
//!
//! ## Available Agents
//!
//! | Agent | Role | Broker |
//! |-------|------|--------|
//! | [`TriageAgent`] | Classifies and assigns new tickets | publishes |
//! | [`DevMonitorAgent`] | Blocker and stall detection | publishes |
//! | [`QaReleaseAgent`] | Review queue listing | none |
//! | [`ScrumMasterAgent`] | Sprint health, risk, balance, escalation | drains |

pub mod collaborators;
pub mod dev_monitor;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod qa_release;
pub mod roles;
pub mod scrum_master;
pub mod traits;
pub mod triage;

pub use collaborators::{
    ActivitySource, Classifier, FieldUpdate, Reporter, Sentiment, SentimentSignal, TicketQuery,
    TicketSource, TriageClassification,
};
pub use dev_monitor::{DevMonitorAgent, DEFAULT_LOOKBACK_DAYS};
pub use error::{AgentError, AgentResult};
pub use orchestrator::{Orchestrator, RunReport, RunState};
pub use qa_release::QaReleaseAgent;
pub use roles::{AgentRole, BrokerAccess};
pub use scrum_master::ScrumMasterAgent;
pub use traits::{
    ActionTaken, ActionType, AgentHandler, AgentIssue, AgentReport, IssueSeverity, RunContext,
};
pub use triage::TriageAgent;
