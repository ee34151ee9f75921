//! Tracker error types

use std::time::Duration;

use mpitracker_common::JobControlAction;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("job template rejected: {0}")]
    Compilation(#[from] mpitracker_mpijob::CompilationError),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Common(#[from] mpitracker_common::Error),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("created MPIJob has no name")]
    MissingName,

    #[error("timed out after {timeout:?} waiting for job '{job}'")]
    WaitTimeout { job: String, timeout: Duration },

    #[error("wait for job '{0}' cancelled")]
    Cancelled(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(JobControlAction),
}

impl TrackerError {
    /// Whether the same call may succeed later without changing its input
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) => true,
            Self::Common(e) => e.is_retryable(),
            _ => false,
        }
    }
}
