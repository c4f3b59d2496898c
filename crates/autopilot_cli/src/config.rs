//! Configuration from the environment and the optional team file.
//!
//! Credentials are only ever read from environment variables (a `.env`
//! file is loaded first when present). Anything missing is a
//! [`ConfigError`] and aborts the command before an agent runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use autopilot_core::{DeveloperProfile, KnowledgeStore, Specialization};
use autopilot_services::{GeminiConfig, JiraConfig, SmtpConfig};

pub const JIRA_DOMAIN: &str = "JIRA_DOMAIN";
pub const JIRA_EMAIL: &str = "JIRA_EMAIL";
pub const API_TOKEN: &str = "API_TOKEN";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const SENDER_EMAIL: &str = "SENDER_EMAIL";
pub const SENDER_PASSWORD: &str = "SENDER_PASSWORD";
pub const RECIPIENT_EMAIL: &str = "RECIPIENT_EMAIL";
pub const SMTP_HOST: &str = "SMTP_HOST";
pub const SMTP_PORT: &str = "SMTP_PORT";
pub const DEFAULT_DEVELOPER_ID: &str = "AUTOPILOT_DEFAULT_DEVELOPER_ID";
pub const DEFAULT_DEVELOPER_NAME: &str = "AUTOPILOT_DEFAULT_DEVELOPER_NAME";

/// Configuration errors. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("Team file {path}: {message}")]
    TeamFile { path: PathBuf, message: String },
}

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[cfg(test)]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Value of a variable; blank counts as unset.
    pub fn optional(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }
}

pub fn jira_config(env: &Env) -> Result<JiraConfig, ConfigError> {
    let domain = env.required(JIRA_DOMAIN)?;
    if !domain.starts_with("http://") && !domain.starts_with("https://") {
        return Err(ConfigError::Invalid {
            name: JIRA_DOMAIN.to_string(),
            message: format!("'{}' is not an http(s) URL", domain),
        });
    }
    Ok(JiraConfig::new(domain, env.required(JIRA_EMAIL)?, env.required(API_TOKEN)?))
}

pub fn gemini_config(env: &Env) -> Result<GeminiConfig, ConfigError> {
    let config = GeminiConfig::new(env.required(GEMINI_API_KEY)?);
    Ok(match env.optional(GEMINI_MODEL) {
        Some(model) => config.with_model(model),
        None => config,
    })
}

/// SMTP settings, or `None` unless sender, password and recipient are all set.
pub fn smtp_config(env: &Env) -> Result<Option<SmtpConfig>, ConfigError> {
    let (Some(sender), Some(password), Some(recipient)) = (
        env.optional(SENDER_EMAIL),
        env.optional(SENDER_PASSWORD),
        env.optional(RECIPIENT_EMAIL),
    ) else {
        return Ok(None);
    };

    let mut config = SmtpConfig::new(sender, password, recipient);
    let host = env.optional(SMTP_HOST).unwrap_or_else(|| config.host.clone());
    let port = match env.optional(SMTP_PORT) {
        Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
            name: SMTP_PORT.to_string(),
            message: e.to_string(),
        })?,
        None => config.port,
    };
    config = config.with_server(host, port);
    Ok(Some(config))
}

/// Single FullStack developer used when no team file is given.
pub fn default_developer(env: &Env) -> Option<DeveloperProfile> {
    let id = env.optional(DEFAULT_DEVELOPER_ID)?;
    let name = env.optional(DEFAULT_DEVELOPER_NAME).unwrap_or_else(|| id.clone());
    Some(DeveloperProfile::new(id, name, Specialization::FullStack))
}

#[derive(Debug, Deserialize)]
struct TeamFile {
    #[serde(default)]
    developer: Vec<TeamMember>,
}

#[derive(Debug, Deserialize)]
struct TeamMember {
    id: String,
    name: String,
    specialization: String,
    #[serde(default)]
    workload: u32,
}

/// Read developer profiles from a TOML team file.
///
/// ```toml
/// [[developer]]
/// id = "5b10ac8d82e05b22cc7d4ef5"
/// name = "Ada"
/// specialization = "Backend"
/// workload = 2
/// ```
pub fn load_team_file(path: &Path) -> Result<Vec<DeveloperProfile>, ConfigError> {
    let team_error = |message: String| ConfigError::TeamFile {
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| team_error(e.to_string()))?;
    let file: TeamFile = toml::from_str(&content).map_err(|e| team_error(e.to_string()))?;

    file.developer
        .into_iter()
        .map(|member| {
            let specialization = member
                .specialization
                .parse::<Specialization>()
                .map_err(|e| team_error(format!("developer {}: {}", member.id, e)))?;
            Ok(DeveloperProfile::new(member.id, member.name, specialization).with_workload(member.workload))
        })
        .collect()
}

/// Seed an empty store from the team file, or else the default developer.
pub fn seed_team(store: &KnowledgeStore, team_file: Option<&Path>, env: &Env) -> anyhow::Result<usize> {
    let profiles = match team_file {
        Some(path) => load_team_file(path)?,
        None => default_developer(env).into_iter().collect(),
    };

    if profiles.is_empty() {
        debug!("No seed profiles configured");
        return Ok(0);
    }

    let seeded = store.seed_profiles(&profiles)?;
    if seeded > 0 {
        info!(seeded, "Developer profiles seeded");
    }
    Ok(seeded)
}
