//! Common types for the MPI job tracker: generic job model, errors and utilities

#![deny(missing_docs)]

pub mod error;
pub mod job;
pub mod kube_utils;
pub mod quantity;
pub mod telemetry;

pub use error::Error;
pub use job::{JobControlAction, JobInfo, JobState, JobTemplate};
pub use quantity::parse_quantity;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace jobs are submitted to when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Value of the `app.kubernetes.io/managed-by` label on submitted jobs
pub const MANAGED_BY: &str = "mpitracker";
