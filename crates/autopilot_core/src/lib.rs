//! # autopilot_core
//!
//! Decision substrate of the sprint autopilot.
//!
//! # Architecture
//!
//! - **KnowledgeStore**: developer profiles and sprint history in SQLite
//! - **MessageBroker**: FIFO relay for signals between agents of one run
//! - **AssignmentEngine**: routes tickets to the least-loaded qualified developer
//! - **RiskAnalyzer**: velocity risk band and scope creep for a sprint
//! - **WorkloadBalancer**: detects load imbalance and proposes one move
//!
//! # Example
//!
//! ```rust,ignore
//! use autopilot_core::{AssignmentEngine, KnowledgeStore, Specialization};
//!
//! let store = KnowledgeStore::open("data/sprint_data.db")?;
//! let engine = AssignmentEngine::new(&store);
//! let outcome = engine.assign(Specialization::Backend)?;
//! ```

pub mod assignment;
pub mod balance;
pub mod broker;
pub mod error;
pub mod models;
pub mod risk;
pub mod store;

pub use assignment::{AssigneeMatch, AssignmentEngine, AssignmentOutcome};
pub use balance::{BalanceReport, RebalanceMove, WorkloadBalancer, IMBALANCE_MARGIN};
pub use broker::{Message, MessageBroker, Topic};
pub use error::{CoreError, CoreResult};
pub use models::{
    parse_timestamp, Comment, DeveloperProfile, Priority, Specialization, SprintInfo,
    SprintSnapshot, Ticket, TicketStatus,
};
pub use risk::{RiskAnalyzer, RiskBand, RiskReport, ScopeCreep, SprintWindow, VelocityRisk};
pub use store::{KnowledgeStore, DEFAULT_VELOCITY_WINDOW};
