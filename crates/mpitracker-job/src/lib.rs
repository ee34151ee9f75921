//! MPIJob tracker
//!
//! Submits generic job templates to the Kubeflow MPI operator and tracks
//! the resulting MPIJobs: state, accounting info, waiting and deletion.

mod client;
mod config;
mod error;
mod tracker;

pub use client::{mpijob_api_resource, KubeMpiJobClient, MpiJobClient};
pub use config::{TrackerConfig, DEFAULT_GENERATE_NAME, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
pub use error::TrackerError;
pub use tracker::MpiJobTracker;
