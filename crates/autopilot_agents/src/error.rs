//! Error types for agents module.

use thiserror::Error;

use autopilot_core::CoreError;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur during agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent execution failed: {agent} - {message}")]
    ExecutionFailed { agent: String, message: String },

    #[error("Ticket tracker error: {0}")]
    Tracker(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Activity source error: {0}")]
    Activity(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl AgentError {
    /// Create an execution failed error.
    pub fn execution_failed(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create a tracker error.
    pub fn tracker(message: impl Into<String>) -> Self {
        Self::Tracker(message.into())
    }

    /// Create a classifier error.
    pub fn classifier(message: impl Into<String>) -> Self {
        Self::Classifier(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
