//! Sprint health forecasting: velocity risk band and scope creep.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::models::{parse_timestamp, SprintInfo, Ticket};

/// Below this share of expected completions a sprint is at high risk.
pub const HIGH_RISK_RATIO: f64 = 0.7;
/// Below this share of expected completions a sprint is at medium risk.
pub const MEDIUM_RISK_RATIO: f64 = 0.9;

/// Velocity risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    High,
    Medium,
    Low,
}

impl RiskBand {
    /// Band for a completed count against the expected count.
    pub fn classify(completed: f64, expected: f64) -> Self {
        if completed < HIGH_RISK_RATIO * expected {
            RiskBand::High
        } else if completed < MEDIUM_RISK_RATIO * expected {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::High => "HIGH",
            RiskBand::Medium => "MEDIUM",
            RiskBand::Low => "LOW",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Start and end of a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SprintWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Read the window from a sprint's raw dates.
    pub fn from_sprint(sprint: &SprintInfo) -> CoreResult<Self> {
        let start = sprint
            .start_date
            .as_deref()
            .ok_or_else(|| CoreError::parse(format!("sprint {} has no start date", sprint.id)))?;
        let end = sprint
            .end_date
            .as_deref()
            .ok_or_else(|| CoreError::parse(format!("sprint {} has no end date", sprint.id)))?;

        Ok(Self::new(parse_timestamp(start)?, parse_timestamp(end)?))
    }

    /// Elapsed share of the window in `[0, 1]`.
    ///
    /// A zero-length or inverted window counts as finished.
    pub fn progress_at(&self, now: DateTime<Utc>) -> f64 {
        if self.end <= self.start {
            return 1.0;
        }
        let total = (self.end - self.start).num_milliseconds() as f64;
        let elapsed = (now - self.start).num_milliseconds() as f64;
        (elapsed / total).clamp(0.0, 1.0)
    }
}

/// Outcome of the velocity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VelocityRisk {
    Assessed {
        band: RiskBand,
        completed: u32,
        expected: f64,
        progress: f64,
        average_velocity: f64,
    },
    /// The sprint has not started yet; no band is meaningful.
    NotYetMeasurable,
    /// Input data was missing or malformed.
    NotComputed { reason: String },
}

impl VelocityRisk {
    pub fn band(&self) -> Option<RiskBand> {
        match self {
            VelocityRisk::Assessed { band, .. } => Some(*band),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            VelocityRisk::Assessed {
                band,
                completed,
                expected,
                progress,
                average_velocity,
            } => format!(
                "Velocity risk: {} ({} completed vs {:.1} expected at {:.0}% of sprint, average velocity {:.1})",
                band,
                completed,
                expected,
                progress * 100.0,
                average_velocity
            ),
            VelocityRisk::NotYetMeasurable => {
                "Velocity risk: not yet measurable (sprint has not progressed)".to_string()
            }
            VelocityRisk::NotComputed { reason } => {
                format!("Velocity risk: not computed ({})", reason)
            }
        }
    }
}

/// Tickets created after the sprint started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCreep {
    pub added: Vec<String>,
    /// Tickets whose creation time could not be read.
    pub skipped: Vec<String>,
}

impl ScopeCreep {
    pub fn detected(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Combined result of both checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub velocity: VelocityRisk,
    /// `None` when the sprint window is unknown.
    pub scope_creep: Option<ScopeCreep>,
}

impl RiskReport {
    /// Report lines in markdown.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("- {}", self.velocity.describe())];

        match &self.scope_creep {
            Some(creep) => {
                if creep.detected() {
                    lines.push(format!(
                        "- Scope creep: {} ticket(s) added after sprint start: {}",
                        creep.added.len(),
                        creep.added.join(", ")
                    ));
                } else {
                    lines.push("- Scope creep: none detected".to_string());
                }
                if !creep.skipped.is_empty() {
                    lines.push(format!(
                        "- Skipped {} ticket(s) with unreadable creation dates: {}",
                        creep.skipped.len(),
                        creep.skipped.join(", ")
                    ));
                }
            }
            None => lines.push("- Scope creep: not computed (sprint window unknown)".to_string()),
        }

        lines
    }
}

/// Evaluates sprint risk at a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct RiskAnalyzer {
    now: DateTime<Utc>,
}

impl Default for RiskAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Band the completed count against historical velocity.
    pub fn velocity_risk(
        &self,
        completed: u32,
        average_velocity: f64,
        window: &SprintWindow,
    ) -> VelocityRisk {
        let progress = window.progress_at(self.now);
        if progress <= 0.0 {
            return VelocityRisk::NotYetMeasurable;
        }

        let expected = average_velocity * progress;
        let band = RiskBand::classify(f64::from(completed), expected);
        debug!(completed, expected, progress, %band, "Velocity risk assessed");

        VelocityRisk::Assessed {
            band,
            completed,
            expected,
            progress,
            average_velocity,
        }
    }

    /// Flag every ticket created strictly after the sprint start.
    pub fn scope_creep(&self, start: DateTime<Utc>, tickets: &[Ticket]) -> ScopeCreep {
        let mut creep = ScopeCreep::default();

        for ticket in tickets {
            match ticket.created_at() {
                Ok(created) if created > start => creep.added.push(ticket.key.clone()),
                Ok(_) => {}
                Err(e) => {
                    warn!(ticket = %ticket.key, "Skipping scope check: {}", e);
                    creep.skipped.push(ticket.key.clone());
                }
            }
        }

        creep
    }

    /// Run both checks for a sprint.
    pub fn analyze(
        &self,
        sprint: &SprintInfo,
        completed: u32,
        average_velocity: f64,
        tickets: &[Ticket],
    ) -> RiskReport {
        match SprintWindow::from_sprint(sprint) {
            Ok(window) => RiskReport {
                velocity: self.velocity_risk(completed, average_velocity, &window),
                scope_creep: Some(self.scope_creep(window.start, tickets)),
            },
            Err(e) => {
                warn!(sprint_id = sprint.id, "Sprint window unusable: {}", e);
                RiskReport {
                    velocity: VelocityRisk::NotComputed {
                        reason: e.to_string(),
                    },
                    scope_creep: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketStatus;
    use chrono::Duration;

    fn ts(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    fn half_way() -> (RiskAnalyzer, SprintWindow) {
        let window = SprintWindow::new(ts("2024-01-01T00:00:00Z"), ts("2024-01-11T00:00:00Z"));
        (RiskAnalyzer::at(ts("2024-01-06T00:00:00Z")), window)
    }

    #[test]
    fn test_band_thresholds_at_half_sprint() {
        let (analyzer, window) = half_way();

        assert_eq!(analyzer.velocity_risk(3, 10.0, &window).band(), Some(RiskBand::High));
        assert_eq!(analyzer.velocity_risk(4, 10.0, &window).band(), Some(RiskBand::Medium));
        assert_eq!(analyzer.velocity_risk(5, 10.0, &window).band(), Some(RiskBand::Low));

        match analyzer.velocity_risk(4, 10.0, &window) {
            VelocityRisk::Assessed { expected, progress, .. } => {
                assert_eq!(expected, 5.0);
                assert_eq!(progress, 0.5);
            }
            other => panic!("unexpected risk: {:?}", other),
        }
    }

    #[test]
    fn test_not_measurable_before_start() {
        let (_, window) = half_way();
        let analyzer = RiskAnalyzer::at(window.start - Duration::days(1));
        assert_eq!(analyzer.velocity_risk(0, 10.0, &window), VelocityRisk::NotYetMeasurable);
    }

    #[test]
    fn test_inverted_window_counts_as_finished() {
        let window = SprintWindow::new(ts("2024-01-10T00:00:00Z"), ts("2024-01-01T00:00:00Z"));
        assert_eq!(window.progress_at(ts("2023-06-01T00:00:00Z")), 1.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let (_, window) = half_way();
        assert_eq!(window.progress_at(ts("2025-01-01T00:00:00Z")), 1.0);
        assert_eq!(window.progress_at(ts("2020-01-01T00:00:00Z")), 0.0);
    }

    #[test]
    fn test_cold_start_velocity_is_low_risk() {
        let (analyzer, window) = half_way();
        assert_eq!(analyzer.velocity_risk(0, 0.0, &window).band(), Some(RiskBand::Low));
    }

    #[test]
    fn test_scope_creep_strictly_after_start() {
        let analyzer = RiskAnalyzer::new();
        let tickets = vec![
            Ticket::new("SM-1", "Late", TicketStatus::ToDo).with_created("2024-01-02"),
            Ticket::new("SM-2", "Planned", TicketStatus::ToDo).with_created("2023-12-31"),
            Ticket::new("SM-3", "Garbled", TicketStatus::ToDo).with_created("last tuesday"),
            Ticket::new("SM-4", "Undated", TicketStatus::ToDo),
        ];

        let creep = analyzer.scope_creep(ts("2024-01-01"), &tickets);
        assert_eq!(creep.added, vec!["SM-1"]);
        assert_eq!(creep.skipped, vec!["SM-3", "SM-4"]);
        assert!(creep.detected());
    }

    #[test]
    fn test_analyze_without_dates_is_not_computed() {
        let analyzer = RiskAnalyzer::new();
        let report = analyzer.analyze(&SprintInfo::new(9, "Sprint 9"), 3, 10.0, &[]);

        assert!(matches!(report.velocity, VelocityRisk::NotComputed { .. }));
        assert!(report.scope_creep.is_none());
        assert!(report.lines().iter().any(|l| l.contains("not computed")));
    }

    #[test]
    fn test_analyze_report_lines() {
        let (analyzer, _) = half_way();
        let sprint = SprintInfo::new(3, "Sprint 3")
            .with_dates("2024-01-01T00:00:00.000Z", "2024-01-11T00:00:00.000Z");
        let tickets = vec![
            Ticket::new("SM-9", "Hotfix", TicketStatus::Done).with_created("2024-01-03T12:00:00.000+0000"),
        ];

        let report = analyzer.analyze(&sprint, 3, 10.0, &tickets);
        let lines = report.lines();
        assert!(lines[0].contains("HIGH"));
        assert!(lines[1].contains("SM-9"));
    }
}
