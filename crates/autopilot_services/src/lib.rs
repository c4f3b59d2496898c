//! # autopilot_services
//!
//! Concrete collaborators for the sprint agents:
//!
//! - [`JiraClient`]: ticket tracker over the Jira Cloud REST API
//! - [`GeminiClassifier`]: triage and sentiment via the Gemini API
//! - [`GitActivitySource`]: recent-commit probe over a local checkout
//! - [`EmailReporter`] / [`ConsoleReporter`]: report delivery

pub mod error;
pub mod gemini;
pub mod git_activity;
pub mod jira;
pub mod notify;

pub use error::{ServiceError, ServiceResult};
pub use gemini::{GeminiClassifier, GeminiConfig, ModelInfo, DEFAULT_MODEL};
pub use git_activity::GitActivitySource;
pub use jira::{adf_to_text, JiraClient, JiraConfig};
pub use notify::{format_report_html, ConsoleReporter, EmailReporter, SmtpConfig};
