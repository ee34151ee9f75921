//! Kubeflow MPIJob serialization types
//!
//! Typed representation of `kubeflow.org/v2beta1` MPIJob resources.
//! Uses serde for JSON compatible with the MPI operator's CRD schema.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

/// API group of the MPI operator
pub const GROUP: &str = "kubeflow.org";
/// API version served by the MPI operator
pub const VERSION: &str = "v2beta1";
/// Full `apiVersion` of MPIJob objects
pub const API_VERSION: &str = "kubeflow.org/v2beta1";
/// Kind of MPIJob objects
pub const KIND: &str = "MPIJob";
/// Plural resource name of MPIJob objects
pub const PLURAL: &str = "mpijobs";

// =============================================================================
// MPIJob
// =============================================================================

/// MPIJob resource (`kubeflow.org/v2beta1` Kind: MPIJob)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MPIJob {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: MPIJobSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MPIJobStatus>,
}

impl MPIJob {
    /// Wrap a spec into an object whose name the API server generates
    pub fn from_spec(spec: MPIJobSpec, namespace: &str, generate_name: &str) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ObjectMeta {
                generate_name: Some(generate_name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    mpitracker_common::MANAGED_BY.to_string(),
                )])),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    /// Server-assigned (or requested) object name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Conditions recorded in status, oldest first
    pub fn conditions(&self) -> &[JobCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// MPIJob spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MPIJobSpec {
    /// Number of MPI slots (processes) per worker pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots_per_worker: Option<i32>,

    #[serde(default)]
    pub run_policy: RunPolicy,

    /// Pod templates keyed by role
    pub mpi_replica_specs: BTreeMap<ReplicaType, ReplicaSpec>,

    /// Directory where the operator mounts the generated SSH keys
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_auth_mount_path: String,

    #[serde(default)]
    pub mpi_implementation: MpiImplementation,
}

impl MPIJobSpec {
    /// Spec of the given role, if present
    pub fn replica_spec(&self, role: ReplicaType) -> Option<&ReplicaSpec> {
        self.mpi_replica_specs.get(&role)
    }

    /// Total slots of the job: slots per worker times worker replicas.
    ///
    /// Unset values count as 1, matching the operator's defaulting.
    pub fn total_slots(&self) -> i64 {
        let slots_per_worker = self.slots_per_worker.unwrap_or(1);
        let workers = self
            .replica_spec(ReplicaType::Worker)
            .and_then(|w| w.replicas)
            .unwrap_or(1);
        i64::from(slots_per_worker) * i64::from(workers)
    }
}

/// Policies applied to the job as a whole
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_pod_policy: Option<CleanPodPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,

    /// Retries of the whole job before it is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
}

/// Which pods are deleted once the job finishes
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CleanPodPolicy {
    /// Keep all pods
    None,
    /// Delete pods that are still running
    #[default]
    Running,
    /// Delete every pod
    All,
}

/// Role of a replica group within an MPIJob
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReplicaType {
    /// Single pod that runs `mpirun`
    Launcher,
    /// Replicated pods that host the MPI ranks
    Worker,
}

impl ReplicaType {
    /// Lowercase name, used for container names
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launcher => "launcher",
            Self::Worker => "worker",
        }
    }
}

impl std::fmt::Display for ReplicaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launcher => write!(f, "Launcher"),
            Self::Worker => write!(f, "Worker"),
        }
    }
}

/// A replica group: pod template plus replica count and restart policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    pub template: PodTemplateSpec,

    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// Pod restart policy for a replica group
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart
    #[default]
    Never,
    /// Restart on failure
    OnFailure,
    /// Always restart
    Always,
    /// Restart depending on the exit code
    ExitCode,
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "Never"),
            Self::OnFailure => write!(f, "OnFailure"),
            Self::Always => write!(f, "Always"),
            Self::ExitCode => write!(f, "ExitCode"),
        }
    }
}

/// MPI runtime the launcher uses to start ranks on workers.
///
/// Values the operator may add later are kept verbatim in `Other` so they
/// reach the API server unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MpiImplementation {
    #[default]
    Intel,
    OpenMpi,
    Mpich,
    Other(String),
}

impl MpiImplementation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Intel => "Intel",
            Self::OpenMpi => "OpenMPI",
            Self::Mpich => "MPICH",
            Self::Other(value) => value,
        }
    }
}

impl std::fmt::Display for MpiImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MpiImplementation {
    fn from(s: &str) -> Self {
        match s {
            "Intel" => Self::Intel,
            "OpenMPI" => Self::OpenMpi,
            "MPICH" => Self::Mpich,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for MpiImplementation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MpiImplementation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value.as_str()))
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status reported by the MPI operator
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MPIJobStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<JobCondition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replica_statuses: BTreeMap<ReplicaType, ReplicaStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<Time>,
}

/// A timestamped status record.
///
/// `type_` stays a raw string so condition types added by newer operators
/// still deserialize.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobCondition {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

/// Pod counts of one replica group
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i32>,
}
