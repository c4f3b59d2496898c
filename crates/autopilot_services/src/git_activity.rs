//! Recent-commit probe over a local git checkout.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::debug;

use autopilot_agents::{ActivitySource, AgentError, AgentResult};

use crate::error::{ServiceError, ServiceResult};

/// Looks for commits that mention a ticket key.
#[derive(Debug, Clone)]
pub struct GitActivitySource {
    repo_path: PathBuf,
}

impl GitActivitySource {
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }

    /// Check if Git is available on the system.
    pub fn is_git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Commits on any branch within the lookback window whose message
    /// mentions `ticket_key` as a whole token, newest first.
    ///
    /// Git's own grep only narrows the search; `SM-12` also contains `SM-1`,
    /// so each message is checked again with [`key_pattern`].
    pub fn matching_commits(&self, ticket_key: &str, lookback_days: u32) -> ServiceResult<Vec<String>> {
        let since = format!("--since={} days ago", lookback_days);
        let grep = format!("--grep={}", ticket_key);

        let output = Command::new("git")
            .args(["log", "--all", "--fixed-strings", "--format=%h%x1f%B%x1e"])
            .arg(&since)
            .arg(&grep)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| ServiceError::Git(format!("Failed to run git log: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::Git(format!("git log failed: {}", stderr.trim())));
        }

        let pattern = key_pattern(ticket_key)?;
        let commits: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split('\x1e')
            .filter_map(|record| record.trim().split_once('\x1f'))
            .filter(|(_, message)| pattern.is_match(message))
            .map(|(hash, message)| format!("{} {}", hash, message.lines().next().unwrap_or_default()))
            .collect();
        debug!(ticket = ticket_key, lookback_days, commits = commits.len(), "Activity probed");
        Ok(commits)
    }
}

/// Matches a ticket key not glued to other letters or digits.
fn key_pattern(ticket_key: &str) -> ServiceResult<Regex> {
    Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9]){}(?:$|[^A-Za-z0-9])",
        regex::escape(ticket_key)
    ))
    .map_err(|e| ServiceError::Git(format!("Invalid ticket key '{}': {}", ticket_key, e)))
}

impl ActivitySource for GitActivitySource {
    fn has_recent_activity(&self, ticket_key: &str, lookback_days: u32) -> AgentResult<bool> {
        self.matching_commits(ticket_key, lookback_days)
            .map(|commits| !commits.is_empty())
            .map_err(|e| AgentError::Activity(e.to_string()))
    }
}
