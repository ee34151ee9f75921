//! Tracker configuration

use std::path::PathBuf;
use std::time::Duration;

use mpitracker_common::DEFAULT_NAMESPACE;

/// Prefix of the server-generated MPIJob names
pub const DEFAULT_GENERATE_NAME: &str = "drmaa2-mpioperator-job-";
/// Interval between status checks while waiting
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Longest `add_and_wait` blocks for a job to finish
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Where and how the tracker submits and watches MPIJobs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Namespace all jobs are created in and looked up from
    pub namespace: String,
    /// Explicit kubeconfig; `None` infers in-cluster or default config
    pub kubeconfig: Option<PathBuf>,
    /// `metadata.generateName` of submitted jobs
    pub generate_name: String,
    pub poll_interval: Duration,
    /// Upper bound for `add_and_wait`
    pub max_wait: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: std::env::var_os(KUBECONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            generate_name: DEFAULT_GENERATE_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl TrackerConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_generate_name(mut self, prefix: impl Into<String>) -> Self {
        self.generate_name = prefix.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}
