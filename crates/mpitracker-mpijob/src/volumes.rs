//! Volume mounts carried in a job template's stage-in files
//!
//! Each mount is one entry keyed by its container path. The value is
//! `<type>[-read]:<name>`; config maps may select a single file with
//! `<type>[-read]:<configmap>:<key>:<path>`.

use tracing::debug;

use mpitracker_common::JobTemplate;

/// Suffix on the type token marking a read-only mount
const READ_ONLY_SUFFIX: &str = "-read";

/// A volume to mount into both launcher and worker containers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeMountSpec {
    /// Path inside the container
    pub mount_path: String,
    pub read_only: bool,
    /// `pvc`, `configmap` or `cm`; checked when the job is compiled
    pub volume_type: String,
    /// Claim or config map name, optionally followed by `:<key>:<path>`
    pub volume_name: String,
}

/// Supported volume sources
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeKind {
    ConfigMap,
    PersistentVolumeClaim,
}

impl std::str::FromStr for VolumeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "configmap" | "cm" => Ok(Self::ConfigMap),
            "pvc" => Ok(Self::PersistentVolumeClaim),
            other => Err(format!(
                "unsupported volume type '{}' (only configmap, cm, pvc allowed)",
                other
            )),
        }
    }
}

/// Store volume mounts in the template's stage-in files
pub fn set_volume_mounts(mut jt: JobTemplate, mounts: &[VolumeMountSpec]) -> JobTemplate {
    for mount in mounts {
        let volume_type = if mount.read_only {
            format!("{}{}", mount.volume_type, READ_ONLY_SUFFIX)
        } else {
            mount.volume_type.clone()
        };
        jt.stage_in_files.insert(
            mount.mount_path.clone(),
            format!("{}:{}", volume_type, mount.volume_name),
        );
    }
    jt
}

/// Read volume mounts back from the template's stage-in files.
///
/// Entries without a `:` are not volume mounts and are skipped. The result
/// follows the mount path order of the stage-in map.
pub fn volume_mounts(jt: &JobTemplate) -> Vec<VolumeMountSpec> {
    jt.stage_in_files
        .iter()
        .filter_map(|(mount_path, value)| {
            let Some((type_token, volume_name)) = value.split_once(':') else {
                debug!(mount_path = %mount_path, value = %value, "skipping malformed volume mount");
                return None;
            };
            let (volume_type, read_only) = match type_token.strip_suffix(READ_ONLY_SUFFIX) {
                Some(t) => (t, true),
                None => (type_token, false),
            };
            Some(VolumeMountSpec {
                mount_path: mount_path.clone(),
                read_only,
                volume_type: volume_type.to_string(),
                volume_name: volume_name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(path: &str, read_only: bool, volume_type: &str, name: &str) -> VolumeMountSpec {
        VolumeMountSpec {
            mount_path: path.to_string(),
            read_only,
            volume_type: volume_type.to_string(),
            volume_name: name.to_string(),
        }
    }

    #[test]
    fn encodes_type_read_flag_and_name() {
        let jt = set_volume_mounts(
            JobTemplate::default(),
            &[
                mount("/data", false, "pvc", "claim-a"),
                mount("/scripts", true, "configmap", "cm-a:file.sh:file.sh"),
            ],
        );
        assert_eq!(jt.stage_in_files["/data"], "pvc:claim-a");
        assert_eq!(
            jt.stage_in_files["/scripts"],
            "configmap-read:cm-a:file.sh:file.sh"
        );
    }

    #[test]
    fn round_trip_is_order_independent() {
        let a = mount("/storage", false, "pvc", "foam-tutorials-claim");
        let b = mount("/scripts", true, "cm", "dambreak-job:damBreak.sh:damBreak.sh");

        let forward = volume_mounts(&set_volume_mounts(
            JobTemplate::default(),
            &[a.clone(), b.clone()],
        ));
        let backward = volume_mounts(&set_volume_mounts(
            JobTemplate::default(),
            &[b.clone(), a.clone()],
        ));

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 2);
        assert!(forward.contains(&a));
        assert!(forward.contains(&b));
    }

    #[test]
    fn name_keeps_everything_after_first_colon() {
        let mut jt = JobTemplate::default();
        jt.stage_in_files
            .insert("/etc/app".to_string(), "cm:settings:app.conf:conf/app.conf".to_string());

        let mounts = volume_mounts(&jt);
        assert_eq!(mounts[0].volume_type, "cm");
        assert!(!mounts[0].read_only);
        assert_eq!(mounts[0].volume_name, "settings:app.conf:conf/app.conf");
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let mut jt = JobTemplate::default();
        jt.stage_in_files
            .insert("/input.txt".to_string(), "input.txt".to_string());
        jt.stage_in_files
            .insert("/data".to_string(), "pvc:claim-a".to_string());

        let mounts = volume_mounts(&jt);
        assert_eq!(mounts, vec![mount("/data", false, "pvc", "claim-a")]);
    }

    #[test]
    fn unknown_types_survive_decoding() {
        let mut jt = JobTemplate::default();
        jt.stage_in_files
            .insert("/tmp".to_string(), "emptydir-read:scratch".to_string());

        let mounts = volume_mounts(&jt);
        assert_eq!(mounts, vec![mount("/tmp", true, "emptydir", "scratch")]);
        assert!(mounts[0].volume_type.parse::<VolumeKind>().is_err());
    }

    #[test]
    fn volume_kind_aliases() {
        assert_eq!("cm".parse::<VolumeKind>(), Ok(VolumeKind::ConfigMap));
        assert_eq!("configmap".parse::<VolumeKind>(), Ok(VolumeKind::ConfigMap));
        assert_eq!(
            "pvc".parse::<VolumeKind>(),
            Ok(VolumeKind::PersistentVolumeClaim)
        );
    }
}
