//! MPI-specific settings carried in a job template's extension list
//!
//! Every setting is stored under a fixed key as a plain string so that
//! templates persisted by other tools stay readable:
//!
//! | Key | Value | Default |
//! |---|---|---|
//! | `workerImage` | image reference | the template's job category |
//! | `workerCommand` | tokens joined by `<!~!>` | image entrypoint |
//! | `slotsPerWorker` | decimal integer | 1 |
//! | `sshMountPath` | path | `/root/.ssh` |
//! | `mpiImplementation` | `Intel`, `OpenMPI`, `MPICH` or any operator value | `Intel` |
//! | `runAsUser` | decimal uid, `-1` for unset | unset |
//! | `resource{Request,Limit}{Launcher,Worker}-<name>` | quantity | none |

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::warn;

use mpitracker_common::{parse_quantity, JobTemplate};

use crate::types::{MpiImplementation, ReplicaType};

/// Separator between worker command tokens; chosen not to occur in real arguments
pub const WORKER_COMMAND_SEPARATOR: &str = "<!~!>";
/// Slots per worker when unset or unparseable
pub const DEFAULT_SLOTS_PER_WORKER: i32 = 1;
/// Mount path of the SSH keys when unset
pub const DEFAULT_SSH_MOUNT_PATH: &str = "/root/.ssh";
/// Wire value of `runAsUser` meaning "keep the image's user"
pub const RUN_AS_USER_UNSET: i64 = -1;

/// Resource name to quantity, as used in container resource requirements
pub type ResourceList = BTreeMap<String, Quantity>;

// =============================================================================
// Keys
// =============================================================================

/// Scalar extension keys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionKey {
    WorkerImage,
    WorkerCommand,
    SlotsPerWorker,
    MpiImplementation,
    SshMountPath,
    RunAsUser,
}

impl ExtensionKey {
    pub const ALL: [ExtensionKey; 6] = [
        Self::WorkerImage,
        Self::WorkerCommand,
        Self::SlotsPerWorker,
        Self::MpiImplementation,
        Self::SshMountPath,
        Self::RunAsUser,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkerImage => "workerImage",
            Self::WorkerCommand => "workerCommand",
            Self::SlotsPerWorker => "slotsPerWorker",
            Self::MpiImplementation => "mpiImplementation",
            Self::SshMountPath => "sshMountPath",
            Self::RunAsUser => "runAsUser",
        }
    }
}

/// Resource requirement groups, one key prefix each
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceGroup {
    LauncherRequests,
    LauncherLimits,
    WorkerRequests,
    WorkerLimits,
}

impl ResourceGroup {
    pub const ALL: [ResourceGroup; 4] = [
        Self::LauncherRequests,
        Self::LauncherLimits,
        Self::WorkerRequests,
        Self::WorkerLimits,
    ];

    /// Key prefix; the resource name follows it
    pub fn prefix(self) -> &'static str {
        match self {
            Self::LauncherRequests => "resourceRequestLauncher-",
            Self::LauncherLimits => "resourceLimitLauncher-",
            Self::WorkerRequests => "resourceRequestWorker-",
            Self::WorkerLimits => "resourceLimitWorker-",
        }
    }

    /// Requests and limits groups of a role
    pub fn for_role(role: ReplicaType) -> (ResourceGroup, ResourceGroup) {
        match role {
            ReplicaType::Launcher => (Self::LauncherRequests, Self::LauncherLimits),
            ReplicaType::Worker => (Self::WorkerRequests, Self::WorkerLimits),
        }
    }
}

// =============================================================================
// Worker command
// =============================================================================

/// Worker entrypoint split into container command and args.
///
/// The first token becomes the command and the rest its arguments. An
/// empty first token leaves the command unset so the image entrypoint runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerCommand {
    pub command: Option<Vec<String>>,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn from_tokens(mut tokens: Vec<String>) -> Self {
        if tokens.is_empty() {
            return Self::default();
        }
        let args = tokens.split_off(1);
        let command = tokens.pop().filter(|c| !c.is_empty()).map(|c| vec![c]);
        Self { command, args }
    }
}

// =============================================================================
// Template accessors
// =============================================================================

/// Typed access to the MPI extensions of a `JobTemplate`.
///
/// Setters consume and return the template so they chain; getters apply the
/// documented defaults when a value is absent or empty.
pub trait MpiExtensionsExt: Sized {
    fn with_worker_image(self, image: impl Into<String>) -> Self;
    /// Worker image, falling back to the job category
    fn worker_image(&self) -> &str;

    fn with_worker_command<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Raw worker command tokens, `None` when no override is set
    fn worker_command(&self) -> Option<Vec<String>>;

    fn with_slots_per_worker(self, slots: i32) -> Self;
    fn slots_per_worker(&self) -> i32;

    fn with_ssh_mount_path(self, path: impl Into<String>) -> Self;
    fn ssh_mount_path(&self) -> &str;

    fn with_mpi_implementation(self, implementation: MpiImplementation) -> Self;
    fn mpi_implementation(&self) -> MpiImplementation;

    /// Set the uid both roles run as; `RUN_AS_USER_UNSET` clears it
    fn with_run_as_user(self, uid: i64) -> Self;
    fn run_as_user(&self) -> Option<i64>;

    fn with_resources(self, group: ResourceGroup, resources: &ResourceList) -> Self;
    /// Decode one resource group; entries with unparseable quantities are skipped
    fn resources(&self, group: ResourceGroup) -> ResourceList;
}

impl MpiExtensionsExt for JobTemplate {
    fn with_worker_image(mut self, image: impl Into<String>) -> Self {
        self.set_extension(ExtensionKey::WorkerImage.as_str(), image);
        self
    }

    fn worker_image(&self) -> &str {
        self.extension(ExtensionKey::WorkerImage.as_str())
            .unwrap_or(self.job_category.as_str())
    }

    fn with_worker_command<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined = tokens
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>()
            .join(WORKER_COMMAND_SEPARATOR);
        self.set_extension(ExtensionKey::WorkerCommand.as_str(), joined);
        self
    }

    fn worker_command(&self) -> Option<Vec<String>> {
        self.extension_list
            .get(ExtensionKey::WorkerCommand.as_str())
            .map(|v| v.split(WORKER_COMMAND_SEPARATOR).map(String::from).collect())
    }

    fn with_slots_per_worker(mut self, slots: i32) -> Self {
        self.set_extension(ExtensionKey::SlotsPerWorker.as_str(), slots.to_string());
        self
    }

    fn slots_per_worker(&self) -> i32 {
        self.extension(ExtensionKey::SlotsPerWorker.as_str())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SLOTS_PER_WORKER)
    }

    fn with_ssh_mount_path(mut self, path: impl Into<String>) -> Self {
        self.set_extension(ExtensionKey::SshMountPath.as_str(), path);
        self
    }

    fn ssh_mount_path(&self) -> &str {
        self.extension(ExtensionKey::SshMountPath.as_str())
            .unwrap_or(DEFAULT_SSH_MOUNT_PATH)
    }

    fn with_mpi_implementation(mut self, implementation: MpiImplementation) -> Self {
        self.set_extension(
            ExtensionKey::MpiImplementation.as_str(),
            implementation.to_string(),
        );
        self
    }

    fn mpi_implementation(&self) -> MpiImplementation {
        self.extension(ExtensionKey::MpiImplementation.as_str())
            .map(MpiImplementation::from)
            .unwrap_or_default()
    }

    fn with_run_as_user(mut self, uid: i64) -> Self {
        self.set_extension(ExtensionKey::RunAsUser.as_str(), uid.to_string());
        self
    }

    fn run_as_user(&self) -> Option<i64> {
        self.extension(ExtensionKey::RunAsUser.as_str())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|uid| *uid != RUN_AS_USER_UNSET)
    }

    fn with_resources(mut self, group: ResourceGroup, resources: &ResourceList) -> Self {
        for (name, quantity) in resources {
            let key = format!("{}{}", group.prefix(), name);
            match parse_quantity(&quantity.0) {
                Ok(canonical) => self.set_extension(key, canonical.0),
                Err(e) => {
                    warn!(key = %key, value = %quantity.0, error = %e, "not storing invalid resource quantity");
                }
            }
        }
        self
    }

    fn resources(&self, group: ResourceGroup) -> ResourceList {
        let mut resources = ResourceList::new();
        for (key, value) in &self.extension_list {
            let Some(name) = key.strip_prefix(group.prefix()) else {
                continue;
            };
            if name.is_empty() {
                warn!(key = %key, "skipping resource extension without a resource name");
                continue;
            }
            match parse_quantity(value) {
                Ok(quantity) => {
                    resources.insert(name.to_string(), quantity);
                }
                Err(e) => {
                    warn!(key = %key, value = %value, error = %e, "failed to parse resource quantity");
                }
            }
        }
        resources
    }
}

// =============================================================================
// Decoded settings
// =============================================================================

/// All MPI extensions of a template, decoded at once.
///
/// `None` and empty resource groups mean "not set"; applying them leaves
/// the template's existing value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MpiExtensions {
    pub worker_image: Option<String>,
    pub worker_command: Option<Vec<String>>,
    pub slots_per_worker: Option<i32>,
    pub ssh_mount_path: Option<String>,
    pub mpi_implementation: Option<MpiImplementation>,
    pub run_as_user: Option<i64>,
    pub resources: BTreeMap<ResourceGroup, ResourceList>,
}

impl MpiExtensions {
    pub fn from_template(jt: &JobTemplate) -> Self {
        Self {
            worker_image: jt
                .extension(ExtensionKey::WorkerImage.as_str())
                .map(String::from),
            worker_command: jt.worker_command(),
            slots_per_worker: jt
                .extension(ExtensionKey::SlotsPerWorker.as_str())
                .and_then(|v| v.trim().parse().ok()),
            ssh_mount_path: jt
                .extension(ExtensionKey::SshMountPath.as_str())
                .map(String::from),
            mpi_implementation: jt
                .extension(ExtensionKey::MpiImplementation.as_str())
                .map(MpiImplementation::from),
            run_as_user: jt.run_as_user(),
            resources: ResourceGroup::ALL
                .into_iter()
                .map(|group| (group, jt.resources(group)))
                .filter(|(_, resources)| !resources.is_empty())
                .collect(),
        }
    }

    /// Write every set value into the template's extension list
    pub fn apply(self, mut jt: JobTemplate) -> JobTemplate {
        if let Some(image) = self.worker_image {
            jt = jt.with_worker_image(image);
        }
        if let Some(tokens) = self.worker_command {
            jt = jt.with_worker_command(tokens);
        }
        if let Some(slots) = self.slots_per_worker {
            jt = jt.with_slots_per_worker(slots);
        }
        if let Some(path) = self.ssh_mount_path {
            jt = jt.with_ssh_mount_path(path);
        }
        if let Some(implementation) = self.mpi_implementation {
            jt = jt.with_mpi_implementation(implementation);
        }
        if let Some(uid) = self.run_as_user {
            jt = jt.with_run_as_user(uid);
        }
        for (group, resources) in &self.resources {
            jt = jt.with_resources(*group, resources);
        }
        jt
    }
}
