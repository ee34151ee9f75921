//! MPIJob compilation from generic job templates
//!
//! The template's job category is the launcher image and its slot count the
//! number of workers. Everything MPI-specific (worker image and command,
//! resources, SSH path, uid) comes from the template's extensions, and
//! volumes come from its stage-in files. Both roles are built by the same
//! function so they cannot drift apart.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, KeyToPath, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use tracing::{debug, warn};

use mpitracker_common::JobTemplate;

use crate::error::CompilationError;
use crate::extensions::{MpiExtensionsExt, ResourceGroup, WorkerCommand};
use crate::types::{
    CleanPodPolicy, MPIJob, MPIJobSpec, ReplicaSpec, ReplicaType, RestartPolicy, RunPolicy,
};
use crate::volumes::{volume_mounts, VolumeKind, VolumeMountSpec};

/// A volume source plus the mount that attaches it to a container
#[derive(Clone, Debug, PartialEq)]
struct CompiledVolume {
    mount: VolumeMount,
    volume: Volume,
}

/// Everything that differs between the launcher and worker pod templates
struct RoleTemplate<'a> {
    role: ReplicaType,
    image: &'a str,
    command: Option<Vec<String>>,
    args: Vec<String>,
}

/// Compile a job template into an MPIJob spec.
///
/// Fails only when the template cannot describe an MPI job at all (no
/// launcher image or no workers). Individual extensions or volumes that do
/// not decode are logged and left out.
pub fn compile_mpijob_spec(jt: &JobTemplate) -> Result<MPIJobSpec, CompilationError> {
    if jt.job_category.is_empty() {
        return Err(CompilationError::MissingJobCategory);
    }

    let slots = jt.min_slots.max(jt.max_slots);
    if slots <= 0 {
        return Err(CompilationError::MissingSlotCount);
    }
    let worker_replicas =
        i32::try_from(slots).map_err(|_| CompilationError::InvalidSlotCount(slots))?;

    let volumes = compile_volumes(&volume_mounts(jt));

    let launcher = RoleTemplate {
        role: ReplicaType::Launcher,
        image: &jt.job_category,
        command: (!jt.remote_command.is_empty()).then(|| vec![jt.remote_command.clone()]),
        args: jt.args.clone(),
    };

    let worker_command = WorkerCommand::from_tokens(jt.worker_command().unwrap_or_default());
    let worker = RoleTemplate {
        role: ReplicaType::Worker,
        image: jt.worker_image(),
        command: worker_command.command,
        args: worker_command.args,
    };

    let mpi_replica_specs = BTreeMap::from([
        (
            ReplicaType::Launcher,
            ReplicaSpec {
                replicas: None,
                template: compile_pod_template(jt, launcher, &volumes),
                restart_policy: RestartPolicy::Never,
            },
        ),
        (
            ReplicaType::Worker,
            ReplicaSpec {
                replicas: Some(worker_replicas),
                template: compile_pod_template(jt, worker, &volumes),
                restart_policy: RestartPolicy::Never,
            },
        ),
    ]);

    debug!(
        launcher_image = %jt.job_category,
        worker_image = %jt.worker_image(),
        workers = worker_replicas,
        volumes = volumes.len(),
        "compiled MPIJob spec"
    );

    Ok(MPIJobSpec {
        slots_per_worker: Some(jt.slots_per_worker()),
        run_policy: RunPolicy {
            clean_pod_policy: Some(CleanPodPolicy::Running),
            backoff_limit: Some(0),
            ..Default::default()
        },
        mpi_replica_specs,
        ssh_auth_mount_path: jt.ssh_mount_path().to_string(),
        mpi_implementation: jt.mpi_implementation(),
    })
}

/// Compile a job template into a complete MPIJob object.
///
/// The name is left to the API server via `generateName`.
pub fn compile_mpijob(
    jt: &JobTemplate,
    namespace: &str,
    generate_name: &str,
) -> Result<MPIJob, CompilationError> {
    let spec = compile_mpijob_spec(jt)?;
    Ok(MPIJob::from_spec(spec, namespace, generate_name))
}

fn compile_pod_template(
    jt: &JobTemplate,
    role: RoleTemplate<'_>,
    volumes: &[CompiledVolume],
) -> PodTemplateSpec {
    let (requests_group, limits_group) = ResourceGroup::for_role(role.role);
    let requests = jt.resources(requests_group);
    let limits = jt.resources(limits_group);
    let resources = (!requests.is_empty() || !limits.is_empty()).then(|| ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    });

    let security_context = jt.run_as_user().map(|uid| SecurityContext {
        run_as_user: Some(uid),
        ..Default::default()
    });

    let container = Container {
        name: role.role.as_str().to_string(),
        image: Some(role.image.to_string()),
        command: role.command,
        args: (!role.args.is_empty()).then_some(role.args),
        working_dir: (!jt.working_directory.is_empty()).then(|| jt.working_directory.clone()),
        resources,
        security_context,
        volume_mounts: (!volumes.is_empty())
            .then(|| volumes.iter().map(|v| v.mount.clone()).collect()),
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: None,
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: (!volumes.is_empty())
                .then(|| volumes.iter().map(|v| v.volume.clone()).collect()),
            ..Default::default()
        }),
    }
}

/// Build volume sources and mounts, named `volume-<index>` by position.
///
/// Mounts with an unsupported type are skipped; their index is not reused.
fn compile_volumes(mounts: &[VolumeMountSpec]) -> Vec<CompiledVolume> {
    mounts
        .iter()
        .enumerate()
        .filter_map(|(index, spec)| {
            let name = format!("volume-{}", index);
            let kind = match spec.volume_type.parse::<VolumeKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(mount_path = %spec.mount_path, error = %e, "skipping volume mount");
                    return None;
                }
            };

            let volume = match kind {
                VolumeKind::ConfigMap => Volume {
                    name: name.clone(),
                    config_map: Some(config_map_source(&spec.volume_name)),
                    ..Default::default()
                },
                VolumeKind::PersistentVolumeClaim => Volume {
                    name: name.clone(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: spec.volume_name.clone(),
                        read_only: Some(spec.read_only),
                    }),
                    ..Default::default()
                },
            };

            Some(CompiledVolume {
                mount: VolumeMount {
                    name,
                    mount_path: spec.mount_path.clone(),
                    read_only: Some(spec.read_only),
                    ..Default::default()
                },
                volume,
            })
        })
        .collect()
}

/// `name` mounts the whole config map, `name:key:path` a single item
fn config_map_source(volume_name: &str) -> ConfigMapVolumeSource {
    let parts: Vec<&str> = volume_name.split(':').collect();
    let items = match parts.as_slice() {
        [_, key, path] => Some(vec![KeyToPath {
            key: key.to_string(),
            path: path.to_string(),
            mode: None,
        }]),
        _ => None,
    };

    ConfigMapVolumeSource {
        name: parts[0].to_string(),
        items,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use crate::extensions::{ResourceList, RUN_AS_USER_UNSET};
    use crate::types::MpiImplementation;
    use crate::volumes::set_volume_mounts;

    fn container(spec: &MPIJobSpec, role: ReplicaType) -> &Container {
        &spec.mpi_replica_specs[&role]
            .template
            .spec
            .as_ref()
            .unwrap()
            .containers[0]
    }

    fn pod_volumes(spec: &MPIJobSpec, role: ReplicaType) -> &[Volume] {
        spec.mpi_replica_specs[&role]
            .template
            .spec
            .as_ref()
            .unwrap()
            .volumes
            .as_deref()
            .unwrap_or_default()
    }

    fn pi_template() -> JobTemplate {
        JobTemplate {
            job_category: "img:intel".to_string(),
            args: vec![
                "mpirun".to_string(),
                "-n".to_string(),
                "2".to_string(),
                "hostname".to_string(),
            ],
            min_slots: 2,
            max_slots: 2,
            ..Default::default()
        }
    }

    fn resources(entries: &[(&str, &str)]) -> ResourceList {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
            .collect()
    }

    fn mount(path: &str, read_only: bool, volume_type: &str, name: &str) -> VolumeMountSpec {
        VolumeMountSpec {
            mount_path: path.to_string(),
            read_only,
            volume_type: volume_type.to_string(),
            volume_name: name.to_string(),
        }
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn pi_template_compiles_with_image_entrypoint() {
        let spec = compile_mpijob_spec(&pi_template()).unwrap();

        let launcher = container(&spec, ReplicaType::Launcher);
        assert_eq!(launcher.name, "launcher");
        assert_eq!(launcher.image.as_deref(), Some("img:intel"));
        assert_eq!(launcher.command, None);
        assert_eq!(
            launcher.args,
            Some(vec![
                "mpirun".to_string(),
                "-n".to_string(),
                "2".to_string(),
                "hostname".to_string()
            ])
        );
        assert_eq!(spec.mpi_replica_specs[&ReplicaType::Worker].replicas, Some(2));
        assert_eq!(spec.mpi_replica_specs[&ReplicaType::Launcher].replicas, None);
    }

    #[test]
    fn run_policy_and_global_defaults() {
        let spec = compile_mpijob_spec(&pi_template()).unwrap();

        assert_eq!(spec.slots_per_worker, Some(1));
        assert_eq!(spec.ssh_auth_mount_path, "/root/.ssh");
        assert_eq!(spec.mpi_implementation, MpiImplementation::Intel);
        assert_eq!(spec.run_policy.backoff_limit, Some(0));
        assert_eq!(spec.run_policy.clean_pod_policy, Some(CleanPodPolicy::Running));
        for role in [ReplicaType::Launcher, ReplicaType::Worker] {
            assert_eq!(
                spec.mpi_replica_specs[&role].restart_policy,
                RestartPolicy::Never
            );
        }
    }

    #[test]
    fn worker_defaults_to_launcher_image_and_entrypoint() {
        let spec = compile_mpijob_spec(&pi_template()).unwrap();

        let worker = container(&spec, ReplicaType::Worker);
        assert_eq!(worker.name, "worker");
        assert_eq!(worker.image.as_deref(), Some("img:intel"));
        assert_eq!(worker.command, None);
        assert_eq!(worker.args, None);
        assert!(worker.resources.is_none());
        assert!(worker.security_context.is_none());
        assert!(worker.volume_mounts.is_none());
    }

    #[test]
    fn replicas_use_larger_of_min_and_max_slots() {
        let mut jt = pi_template();
        jt.min_slots = 3;
        jt.max_slots = 0;
        let spec = compile_mpijob_spec(&jt).unwrap();
        assert_eq!(spec.mpi_replica_specs[&ReplicaType::Worker].replicas, Some(3));

        jt.min_slots = 2;
        jt.max_slots = 5;
        let spec = compile_mpijob_spec(&jt).unwrap();
        assert_eq!(spec.mpi_replica_specs[&ReplicaType::Worker].replicas, Some(5));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn empty_template_is_rejected() {
        let result = compile_mpijob_spec(&JobTemplate::default());
        assert!(matches!(result, Err(CompilationError::MissingJobCategory)));
    }

    #[test]
    fn zero_slots_is_rejected() {
        let mut jt = pi_template();
        jt.min_slots = 0;
        jt.max_slots = 0;
        assert!(matches!(
            compile_mpijob_spec(&jt),
            Err(CompilationError::MissingSlotCount)
        ));
    }

    #[test]
    fn oversized_slot_count_is_rejected() {
        let mut jt = pi_template();
        jt.max_slots = i64::from(i32::MAX) + 1;
        assert!(matches!(
            compile_mpijob_spec(&jt),
            Err(CompilationError::InvalidSlotCount(_))
        ));
    }

    // =========================================================================
    // Extensions
    // =========================================================================

    #[test]
    fn remote_command_becomes_launcher_command() {
        let mut jt = pi_template();
        jt.remote_command = "/bin/bash".to_string();
        jt.args = vec!["/home/openfoam/scripts/damBreak.sh".to_string()];
        jt.working_directory = "/home/openfoam".to_string();

        let spec = compile_mpijob_spec(&jt).unwrap();
        let launcher = container(&spec, ReplicaType::Launcher);
        assert_eq!(launcher.command, Some(vec!["/bin/bash".to_string()]));
        assert_eq!(
            launcher.args,
            Some(vec!["/home/openfoam/scripts/damBreak.sh".to_string()])
        );
        assert_eq!(launcher.working_dir.as_deref(), Some("/home/openfoam"));
        assert_eq!(
            container(&spec, ReplicaType::Worker).working_dir.as_deref(),
            Some("/home/openfoam")
        );
    }

    #[test]
    fn worker_command_and_image_come_from_extensions() {
        let jt = pi_template()
            .with_worker_image("img:worker")
            .with_worker_command(["/usr/sbin/sshd", "-De", "-f", "/home/mpiuser/.sshd_config"])
            .with_ssh_mount_path("/home/mpiuser/.ssh")
            .with_slots_per_worker(2)
            .with_mpi_implementation(MpiImplementation::OpenMpi);

        let spec = compile_mpijob_spec(&jt).unwrap();
        let worker = container(&spec, ReplicaType::Worker);
        assert_eq!(worker.image.as_deref(), Some("img:worker"));
        assert_eq!(worker.command, Some(vec!["/usr/sbin/sshd".to_string()]));
        assert_eq!(
            worker.args,
            Some(vec![
                "-De".to_string(),
                "-f".to_string(),
                "/home/mpiuser/.sshd_config".to_string()
            ])
        );
        assert_eq!(spec.ssh_auth_mount_path, "/home/mpiuser/.ssh");
        assert_eq!(spec.slots_per_worker, Some(2));
        assert_eq!(spec.mpi_implementation, MpiImplementation::OpenMpi);
        // The launcher keeps the job category image
        assert_eq!(
            container(&spec, ReplicaType::Launcher).image.as_deref(),
            Some("img:intel")
        );
    }

    #[test]
    fn operator_specific_mpi_implementation_reaches_the_wire() {
        let mut jt = pi_template();
        jt.set_extension("mpiImplementation", "openmpi");

        let spec = compile_mpijob_spec(&jt).unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["mpiImplementation"], "openmpi");
    }

    #[test]
    fn worker_command_with_empty_first_token_keeps_entrypoint() {
        let jt = pi_template().with_worker_command(["", "--port", "2222"]);
        let spec = compile_mpijob_spec(&jt).unwrap();
        let worker = container(&spec, ReplicaType::Worker);
        assert_eq!(worker.command, None);
        assert_eq!(
            worker.args,
            Some(vec!["--port".to_string(), "2222".to_string()])
        );
    }

    #[test]
    fn run_as_user_applies_to_both_containers() {
        let jt = pi_template().with_run_as_user(1000);
        let spec = compile_mpijob_spec(&jt).unwrap();
        for role in [ReplicaType::Launcher, ReplicaType::Worker] {
            let sc = container(&spec, role).security_context.as_ref().unwrap();
            assert_eq!(sc.run_as_user, Some(1000));
        }
    }

    #[test]
    fn unset_run_as_user_adds_no_security_context() {
        let jt = pi_template().with_run_as_user(RUN_AS_USER_UNSET);
        let spec = compile_mpijob_spec(&jt).unwrap();
        for role in [ReplicaType::Launcher, ReplicaType::Worker] {
            assert!(container(&spec, role).security_context.is_none());
        }
    }

    #[test]
    fn resources_are_applied_per_role() {
        let jt = pi_template()
            .with_resources(
                ResourceGroup::LauncherRequests,
                &resources(&[("cpu", "1"), ("memory", "1Gi")]),
            )
            .with_resources(ResourceGroup::LauncherLimits, &resources(&[("cpu", "1")]))
            .with_resources(ResourceGroup::WorkerRequests, &resources(&[("cpu", "2")]))
            .with_resources(ResourceGroup::WorkerLimits, &resources(&[("cpu", "2")]));

        let spec = compile_mpijob_spec(&jt).unwrap();

        let launcher = container(&spec, ReplicaType::Launcher)
            .resources
            .as_ref()
            .unwrap();
        let requests = launcher.requests.as_ref().unwrap();
        assert_eq!(requests["cpu"], Quantity("1".to_string()));
        assert_eq!(requests["memory"], Quantity("1Gi".to_string()));
        assert_eq!(
            launcher.limits.as_ref().unwrap()["cpu"],
            Quantity("1".to_string())
        );

        let worker = container(&spec, ReplicaType::Worker)
            .resources
            .as_ref()
            .unwrap();
        assert_eq!(
            worker.requests.as_ref().unwrap()["cpu"],
            Quantity("2".to_string())
        );
        assert_eq!(
            worker.limits.as_ref().unwrap()["cpu"],
            Quantity("2".to_string())
        );
    }

    #[test]
    fn requests_only_leave_limits_unset() {
        let jt = pi_template()
            .with_resources(ResourceGroup::WorkerRequests, &resources(&[("cpu", "500m")]));
        let spec = compile_mpijob_spec(&jt).unwrap();
        let worker = container(&spec, ReplicaType::Worker)
            .resources
            .as_ref()
            .unwrap();
        assert!(worker.limits.is_none());
        assert!(container(&spec, ReplicaType::Launcher).resources.is_none());
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    #[test]
    fn pvc_and_config_map_item_mount_on_both_roles() {
        let jt = set_volume_mounts(
            pi_template(),
            &[
                mount("/data", false, "pvc", "claim-a"),
                mount("/scripts", true, "configmap", "cm-a:file.sh:file.sh"),
            ],
        );

        let spec = compile_mpijob_spec(&jt).unwrap();

        for role in [ReplicaType::Launcher, ReplicaType::Worker] {
            let volumes = pod_volumes(&spec, role);
            assert_eq!(volumes.len(), 2);

            assert_eq!(volumes[0].name, "volume-0");
            let pvc = volumes[0].persistent_volume_claim.as_ref().unwrap();
            assert_eq!(pvc.claim_name, "claim-a");
            assert_eq!(pvc.read_only, Some(false));

            assert_eq!(volumes[1].name, "volume-1");
            let cm = volumes[1].config_map.as_ref().unwrap();
            assert_eq!(cm.name, "cm-a");
            let items = cm.items.as_ref().unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].key, "file.sh");
            assert_eq!(items[0].path, "file.sh");

            let mounts = container(&spec, role).volume_mounts.as_ref().unwrap();
            assert_eq!(mounts.len(), 2);
            assert_eq!(mounts[0].name, "volume-0");
            assert_eq!(mounts[0].mount_path, "/data");
            assert_eq!(mounts[0].read_only, Some(false));
            assert_eq!(mounts[1].name, "volume-1");
            assert_eq!(mounts[1].mount_path, "/scripts");
            assert_eq!(mounts[1].read_only, Some(true));
        }
    }

    #[test]
    fn config_map_without_items_mounts_whole_map() {
        let jt = set_volume_mounts(pi_template(), &[mount("/etc/app", false, "cm", "settings")]);
        let spec = compile_mpijob_spec(&jt).unwrap();

        let cm = pod_volumes(&spec, ReplicaType::Worker)[0]
            .config_map
            .as_ref()
            .unwrap();
        assert_eq!(cm.name, "settings");
        assert!(cm.items.is_none());
    }

    #[test]
    fn unsupported_volume_type_is_skipped() {
        let jt = set_volume_mounts(
            pi_template(),
            &[
                mount("/a", false, "pvc", "claim-a"),
                mount("/b", false, "hostpath", "/mnt/b"),
                mount("/c", false, "pvc", "claim-c"),
            ],
        );

        let spec = compile_mpijob_spec(&jt).unwrap();
        let volumes = pod_volumes(&spec, ReplicaType::Launcher);
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["volume-0", "volume-2"]);
        assert_eq!(
            container(&spec, ReplicaType::Worker)
                .volume_mounts
                .as_ref()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let jt = set_volume_mounts(
            pi_template().with_run_as_user(1000),
            &[
                mount("/data", false, "pvc", "claim-a"),
                mount("/scripts", true, "cm", "cm-a:run.sh:run.sh"),
            ],
        );
        assert_eq!(
            compile_mpijob_spec(&jt).unwrap(),
            compile_mpijob_spec(&jt).unwrap()
        );
    }

    // =========================================================================
    // MPIJob object
    // =========================================================================

    #[test]
    fn mpijob_object_uses_generate_name() {
        let job = compile_mpijob(&pi_template(), "hpc", "drmaa2-mpioperator-job-").unwrap();

        assert_eq!(job.api_version, "kubeflow.org/v2beta1");
        assert_eq!(job.kind, "MPIJob");
        assert_eq!(job.metadata.name, None);
        assert_eq!(
            job.metadata.generate_name.as_deref(),
            Some("drmaa2-mpioperator-job-")
        );
        assert_eq!(job.metadata.namespace.as_deref(), Some("hpc"));
        assert_eq!(
            job.metadata.labels.as_ref().unwrap()["app.kubernetes.io/managed-by"],
            "mpitracker"
        );
        assert!(job.status.is_none());
    }

    #[test]
    fn mpijob_object_serializes_pod_templates() {
        let job = compile_mpijob(&pi_template(), "default", "job-").unwrap();
        let json = serde_json::to_value(&job).unwrap();

        let launcher = &json["spec"]["mpiReplicaSpecs"]["Launcher"]["template"]["spec"];
        assert_eq!(launcher["containers"][0]["image"], "img:intel");
        assert!(launcher["containers"][0].get("command").is_none());
        assert_eq!(json["spec"]["mpiReplicaSpecs"]["Worker"]["replicas"], 2);
    }

    #[test]
    fn invalid_template_produces_no_object() {
        assert!(compile_mpijob(&JobTemplate::default(), "default", "job-").is_err());
    }
}
