//! Backend-agnostic job types
//!
//! A `JobTemplate` describes a unit of work without reference to any
//! particular scheduler. Backends read what they understand from the
//! fixed fields and carry anything backend-specific in `extension_list`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Job Template
// =============================================================================

/// Generic job description submitted by callers
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    /// Entrypoint override for the primary process; empty keeps the image default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_command: String,

    /// Arguments for the primary process
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Backend-specific category; container backends use it as the image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_category: String,

    /// Working directory inside the job's containers
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_directory: String,

    /// Minimum number of slots requested
    #[serde(default)]
    pub min_slots: i64,

    /// Maximum number of slots requested
    #[serde(default)]
    pub max_slots: i64,

    /// Files or volumes made available to the job, keyed by target path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_in_files: BTreeMap<String, String>,

    /// Open property bag for backend-specific settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extension_list: BTreeMap<String, String>,
}

impl JobTemplate {
    /// Create a template for the given category (image)
    pub fn new(job_category: impl Into<String>) -> Self {
        Self {
            job_category: job_category.into(),
            ..Default::default()
        }
    }

    /// Read an extension value, treating an empty string as absent
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extension_list
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Write (or overwrite) an extension value
    pub fn set_extension(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extension_list.insert(key.into(), value.into());
    }
}

// =============================================================================
// Job State
// =============================================================================

/// Generic job state reported back to callers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum JobState {
    /// No state information has been computed
    #[default]
    Unset,
    /// The backend state could not be mapped
    Undetermined,
    /// Waiting to be scheduled
    Queued,
    /// Queued and on hold
    QueuedHeld,
    /// Executing
    Running,
    /// Suspended while running
    Suspended,
    /// Put back into the queue after a restart
    Requeued,
    /// Requeued and on hold
    RequeuedHeld,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl JobState {
    /// Whether the job can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "Unset"),
            Self::Undetermined => write!(f, "Undetermined"),
            Self::Queued => write!(f, "Queued"),
            Self::QueuedHeld => write!(f, "QueuedHeld"),
            Self::Running => write!(f, "Running"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Requeued => write!(f, "Requeued"),
            Self::RequeuedHeld => write!(f, "RequeuedHeld"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Job Info
// =============================================================================

/// Snapshot of accounting information for a job.
///
/// Times are `None` until the backend has recorded them; a running job has
/// no finish time and a zero wallclock time.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Backend job identifier
    pub id: String,
    /// Total slots allocated to the job
    pub slots: i64,
    /// When the job was accepted by the backend
    pub submission_time: Option<DateTime<Utc>>,
    /// When the job started running
    pub dispatch_time: Option<DateTime<Utc>>,
    /// When the job finished
    pub finish_time: Option<DateTime<Utc>>,
    /// Elapsed time between submission and finish
    pub wallclock_time: Duration,
}

// =============================================================================
// Job Control
// =============================================================================

/// Control actions a caller may request on a submitted job
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobControlAction {
    /// Stop the job and release its resources
    Terminate,
    /// Pause a running job
    Suspend,
    /// Continue a suspended job
    Resume,
    /// Keep a queued job from being scheduled
    Hold,
    /// Release a held job
    Release,
}

impl std::fmt::Display for JobControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminate => write!(f, "terminate"),
            Self::Suspend => write!(f, "suspend"),
            Self::Resume => write!(f, "resume"),
            Self::Hold => write!(f, "hold"),
            Self::Release => write!(f, "release"),
        }
    }
}

impl std::str::FromStr for JobControlAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terminate" => Ok(Self::Terminate),
            "suspend" => Ok(Self::Suspend),
            "resume" => Ok(Self::Resume),
            "hold" => Ok(Self::Hold),
            "release" => Ok(Self::Release),
            other => Err(crate::Error::validation(format!(
                "undefined job operation '{}'",
                other
            ))),
        }
    }
}
