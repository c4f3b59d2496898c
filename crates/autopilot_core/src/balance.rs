//! Workload imbalance detection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::DeveloperProfile;

/// Distance from the team average beyond which a developer is out of balance.
pub const IMBALANCE_MARGIN: f64 = 1.5;

/// One task moved from an overloaded developer to an underloaded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceMove {
    pub from: DeveloperProfile,
    pub to: DeveloperProfile,
}

/// Result of a balance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BalanceReport {
    /// Nobody is outside the margin.
    Balanced { average: f64 },
    /// Only one side is out of balance, so there is no move to propose.
    AverageOnly {
        average: f64,
        overworked: Vec<DeveloperProfile>,
        underworked: Vec<DeveloperProfile>,
    },
    Imbalanced {
        average: f64,
        overworked: Vec<DeveloperProfile>,
        underworked: Vec<DeveloperProfile>,
        suggestion: RebalanceMove,
    },
}

impl BalanceReport {
    pub fn average(&self) -> f64 {
        match self {
            BalanceReport::Balanced { average }
            | BalanceReport::AverageOnly { average, .. }
            | BalanceReport::Imbalanced { average, .. } => *average,
        }
    }

    pub fn suggestion(&self) -> Option<&RebalanceMove> {
        match self {
            BalanceReport::Imbalanced { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Report lines in markdown.
    pub fn lines(&self) -> Vec<String> {
        match self {
            BalanceReport::Balanced { average } => vec![format!(
                "- Workload is balanced (average {:.2} tickets per developer)",
                average
            )],
            BalanceReport::AverageOnly { average, .. } => {
                vec![format!("- Average workload: {:.2} tickets per developer", average)]
            }
            BalanceReport::Imbalanced {
                average,
                overworked,
                underworked,
                suggestion,
            } => vec![
                format!("- Workload imbalance detected (average {:.2})", average),
                format!("  - Overworked: {}", describe(overworked)),
                format!("  - Underworked: {}", describe(underworked)),
                format!(
                    "  - Suggestion: move one task from {} ({}) to {} ({})",
                    suggestion.from.name,
                    suggestion.from.current_workload,
                    suggestion.to.name,
                    suggestion.to.current_workload
                ),
            ],
        }
    }
}

fn describe(profiles: &[DeveloperProfile]) -> String {
    profiles
        .iter()
        .map(|p| format!("{} ({})", p.name, p.current_workload))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Detects load imbalance across the team.
pub struct WorkloadBalancer;

impl WorkloadBalancer {
    /// Classify the team. Returns `None` for an empty team.
    pub fn analyze(profiles: &[DeveloperProfile]) -> Option<BalanceReport> {
        if profiles.is_empty() {
            return None;
        }

        let total: u64 = profiles.iter().map(|p| u64::from(p.current_workload)).sum();
        let average = total as f64 / profiles.len() as f64;

        let mut overworked: Vec<DeveloperProfile> = profiles
            .iter()
            .filter(|p| f64::from(p.current_workload) > average + IMBALANCE_MARGIN)
            .cloned()
            .collect();
        let mut underworked: Vec<DeveloperProfile> = profiles
            .iter()
            .filter(|p| {
                let load = f64::from(p.current_workload);
                load < average - IMBALANCE_MARGIN && load < average
            })
            .cloned()
            .collect();

        overworked.sort_by(|a, b| {
            b.current_workload
                .cmp(&a.current_workload)
                .then_with(|| a.developer_id.cmp(&b.developer_id))
        });
        underworked.sort_by(|a, b| {
            a.current_workload
                .cmp(&b.current_workload)
                .then_with(|| a.developer_id.cmp(&b.developer_id))
        });

        debug!(
            average,
            overworked = overworked.len(),
            underworked = underworked.len(),
            "Workload balance computed"
        );

        let report = match (overworked.first(), underworked.first()) {
            (Some(from), Some(to)) => {
                let suggestion = RebalanceMove {
                    from: from.clone(),
                    to: to.clone(),
                };
                BalanceReport::Imbalanced {
                    average,
                    overworked,
                    underworked,
                    suggestion,
                }
            }
            (None, None) => BalanceReport::Balanced { average },
            _ => BalanceReport::AverageOnly {
                average,
                overworked,
                underworked,
            },
        };

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Specialization;

    fn dev(id: &str, load: u32) -> DeveloperProfile {
        DeveloperProfile::new(id, id.to_uppercase(), Specialization::Backend).with_workload(load)
    }

    #[test]
    fn test_empty_team_has_no_report() {
        assert!(WorkloadBalancer::analyze(&[]).is_none());
    }

    #[test]
    fn test_imbalance_suggests_move() {
        let team = vec![dev("d1", 1), dev("d2", 1), dev("d3", 1), dev("d4", 10)];
        let report = WorkloadBalancer::analyze(&team).unwrap();

        assert_eq!(report.average(), 3.25);
        let suggestion = report.suggestion().unwrap();
        assert_eq!(suggestion.from.developer_id, "d4");
        assert_eq!(suggestion.to.current_workload, 1);
        assert_eq!(suggestion.to.developer_id, "d1");

        match &report {
            BalanceReport::Imbalanced { overworked, underworked, .. } => {
                assert_eq!(overworked.len(), 1);
                assert_eq!(underworked.len(), 3);
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_balanced_team() {
        let team = vec![dev("d1", 2), dev("d2", 3), dev("d3", 2)];
        let report = WorkloadBalancer::analyze(&team).unwrap();
        assert!(matches!(report, BalanceReport::Balanced { .. }));
        assert!(report.lines()[0].contains("balanced"));
    }

    #[test]
    fn test_one_sided_imbalance_reports_average_only() {
        // Average 2.4: d1 is below 0.9, nobody is above 3.9.
        let team = vec![dev("d1", 0), dev("d2", 3), dev("d3", 3), dev("d4", 3), dev("d5", 3)];
        let report = WorkloadBalancer::analyze(&team).unwrap();

        assert!(matches!(report, BalanceReport::AverageOnly { .. }));
        assert!(report.suggestion().is_none());
        assert_eq!(report.lines().len(), 1);
    }

    #[test]
    fn test_most_overloaded_chosen_first() {
        let team = vec![
            dev("d1", 0),
            dev("d2", 9),
            dev("d3", 12),
            dev("d4", 1),
            dev("d5", 1),
            dev("d6", 1),
        ];
        let report = WorkloadBalancer::analyze(&team).unwrap();
        let suggestion = report.suggestion().unwrap();
        assert_eq!(suggestion.from.developer_id, "d3");
        assert_eq!(suggestion.to.developer_id, "d1");
    }
}
