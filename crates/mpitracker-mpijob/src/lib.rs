//! Kubeflow MPIJob compiler for generic job templates
//!
//! Compiles `JobTemplate`s into `kubeflow.org/v2beta1` MPIJob resources and
//! maps the operator's status back to generic job state and info.
//! Pure compilation crate with no API access.

mod compiler;
mod error;
mod extensions;
mod status;
mod types;
mod volumes;

pub use compiler::{compile_mpijob, compile_mpijob_spec};
pub use error::CompilationError;
pub use extensions::{
    ExtensionKey, MpiExtensions, MpiExtensionsExt, ResourceGroup, ResourceList, WorkerCommand,
    DEFAULT_SLOTS_PER_WORKER, DEFAULT_SSH_MOUNT_PATH, RUN_AS_USER_UNSET,
    WORKER_COMMAND_SEPARATOR,
};
pub use status::{job_info_from_mpijob, job_state_from_conditions, ConditionType};
pub use types::{
    CleanPodPolicy, JobCondition, MPIJob, MPIJobSpec, MPIJobStatus, MpiImplementation,
    ReplicaSpec, ReplicaStatus, ReplicaType, RestartPolicy, RunPolicy, API_VERSION, GROUP, KIND,
    PLURAL, VERSION,
};
pub use volumes::{set_volume_mounts, volume_mounts, VolumeKind, VolumeMountSpec};
