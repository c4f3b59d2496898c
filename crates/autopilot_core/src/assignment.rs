//! Routing of new tickets to developers.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::models::{DeveloperProfile, Specialization};
use crate::store::KnowledgeStore;

/// Which branch of the assignee policy produced a developer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssigneeMatch {
    /// A developer with the requested specialization.
    Matched(DeveloperProfile),
    /// No specialist exists; a FullStack developer stands in.
    FallbackMatched {
        requested: Specialization,
        profile: DeveloperProfile,
    },
    /// Neither a specialist nor a FullStack developer exists.
    NoneAvailable { requested: Specialization },
}

impl AssigneeMatch {
    pub fn profile(&self) -> Option<&DeveloperProfile> {
        match self {
            AssigneeMatch::Matched(profile) | AssigneeMatch::FallbackMatched { profile, .. } => {
                Some(profile)
            }
            AssigneeMatch::NoneAvailable { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AssigneeMatch::FallbackMatched { .. })
    }

    /// Convert a miss into [`CoreError::LookupMiss`].
    pub fn into_profile(self) -> CoreResult<DeveloperProfile> {
        match self {
            AssigneeMatch::Matched(profile) => Ok(profile),
            AssigneeMatch::FallbackMatched { profile, .. } => Ok(profile),
            AssigneeMatch::NoneAvailable { requested } => {
                Err(CoreError::LookupMiss(requested.to_string()))
            }
        }
    }
}

/// Result of recording an assignment against the knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// Workload incremented.
    Assigned {
        developer: DeveloperProfile,
        previous_workload: u32,
        new_workload: u32,
        via_fallback: bool,
    },
    /// The developer was chosen but the workload write failed.
    WorkloadNotRecorded {
        developer: DeveloperProfile,
        attempted_workload: u32,
    },
    /// Nobody can take the ticket.
    Unassignable { specialization: Specialization },
}

impl AssignmentOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, AssignmentOutcome::Assigned { .. })
    }
}

/// Picks developers for tickets and keeps their workload counters current.
pub struct AssignmentEngine<'a> {
    store: &'a KnowledgeStore,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(store: &'a KnowledgeStore) -> Self {
        Self { store }
    }

    /// Choose a developer without touching any workload.
    pub fn select(&self, specialization: Specialization) -> CoreResult<AssigneeMatch> {
        self.store.best_assignee(specialization)
    }

    /// Count one more ticket against the chosen developer.
    ///
    /// A failed write is reported, not retried.
    pub fn record(&self, choice: &AssigneeMatch) -> AssignmentOutcome {
        let developer = match choice {
            AssigneeMatch::Matched(profile) | AssigneeMatch::FallbackMatched { profile, .. } => {
                profile.clone()
            }
            AssigneeMatch::NoneAvailable { requested } => {
                return AssignmentOutcome::Unassignable {
                    specialization: *requested,
                };
            }
        };

        let previous_workload = developer.current_workload;
        let new_workload = previous_workload.saturating_add(1);

        if self.store.update_workload(&developer.developer_id, new_workload) {
            info!(
                developer_id = %developer.developer_id,
                previous_workload,
                new_workload,
                "Assignment recorded"
            );
            AssignmentOutcome::Assigned {
                developer: DeveloperProfile {
                    current_workload: new_workload,
                    ..developer
                },
                previous_workload,
                new_workload,
                via_fallback: choice.is_fallback(),
            }
        } else {
            warn!(developer_id = %developer.developer_id, "Assignment made but workload not recorded");
            AssignmentOutcome::WorkloadNotRecorded {
                developer,
                attempted_workload: new_workload,
            }
        }
    }

    /// Select and record in one step.
    pub fn assign(&self, specialization: Specialization) -> CoreResult<AssignmentOutcome> {
        let choice = self.select(specialization)?;
        Ok(self.record(&choice))
    }
}
