//! Mapping MPIJob status back to generic job state and accounting info

use std::time::Duration;

use mpitracker_common::{JobInfo, JobState};

use crate::types::{JobCondition, MPIJob};

/// Condition types reported by the MPI operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionType {
    Created,
    Running,
    Restarting,
    Succeeded,
    Failed,
    /// Anything a newer operator may report
    Unknown(String),
}

impl From<&str> for ConditionType {
    fn from(s: &str) -> Self {
        match s {
            "Created" => Self::Created,
            "Running" => Self::Running,
            "Restarting" => Self::Restarting,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl ConditionType {
    /// Generic state and substate of a job whose latest condition is `self`
    pub fn job_state(&self) -> (JobState, String) {
        match self {
            Self::Created => (JobState::Queued, "created".to_string()),
            Self::Running => (JobState::Running, "running".to_string()),
            Self::Restarting => (JobState::Requeued, "restarting".to_string()),
            Self::Succeeded => (JobState::Done, "succeeded".to_string()),
            Self::Failed => (JobState::Failed, "failed".to_string()),
            Self::Unknown(value) => (
                JobState::Undetermined,
                format!("unknown condition type `{}`", value),
            ),
        }
    }
}

/// Classify a job by its most recent condition.
///
/// A job without conditions has not been picked up by the operator yet and
/// counts as queued.
pub fn job_state_from_conditions(conditions: &[JobCondition]) -> (JobState, String) {
    match conditions.last() {
        Some(condition) => ConditionType::from(condition.type_.as_str()).job_state(),
        None => (JobState::Queued, "no condition".to_string()),
    }
}

/// Project an MPIJob into accounting info.
///
/// Missing start or completion times are left unset; the wallclock time is
/// only computed once both are known.
pub fn job_info_from_mpijob(job: &MPIJob) -> JobInfo {
    let start_time = job
        .status
        .as_ref()
        .and_then(|s| s.start_time.as_ref())
        .map(|t| t.0);
    let completion_time = job
        .status
        .as_ref()
        .and_then(|s| s.completion_time.as_ref())
        .map(|t| t.0);

    let wallclock_time = match (start_time, completion_time) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    };

    JobInfo {
        id: job.name().to_string(),
        slots: job.spec.total_slots(),
        submission_time: start_time,
        dispatch_time: start_time,
        finish_time: completion_time,
        wallclock_time,
    }
}
