//! MPIJob API access
//!
//! The tracker only talks to the cluster through `MpiJobClient`, so its
//! logic can be tested against a mock.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams, TypeMeta};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use mpitracker_common::kube_utils::{create_client, is_not_found};
use mpitracker_mpijob::{MPIJob, API_VERSION, GROUP, KIND, PLURAL, VERSION};

use crate::config::TrackerConfig;
use crate::error::TrackerError;

/// CRUD operations on MPIJobs in a single namespace
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MpiJobClient: Send + Sync {
    /// Create a job and return it as stored by the API server
    async fn create(&self, job: &MPIJob) -> Result<MPIJob, TrackerError>;

    /// Get a job by name; a missing job is `TrackerError::JobNotFound`
    async fn get(&self, name: &str) -> Result<MPIJob, TrackerError>;

    /// List all jobs in the namespace
    async fn list(&self) -> Result<Vec<MPIJob>, TrackerError>;

    /// Delete a job and, in the background, its pods
    async fn delete(&self, name: &str) -> Result<(), TrackerError>;
}

/// `ApiResource` of `kubeflow.org/v2beta1` MPIJobs
pub fn mpijob_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, KIND), PLURAL)
}

/// `MpiJobClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeMpiJobClient {
    api: Api<DynamicObject>,
}

impl KubeMpiJobClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced_with(client, namespace, &mpijob_api_resource()),
        }
    }

    /// Build a client from the tracker's kubeconfig and namespace
    pub async fn connect(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = create_client(config.kubeconfig.as_deref()).await?;
        Ok(Self::new(client, &config.namespace))
    }
}

fn to_dynamic(job: &MPIJob) -> Result<DynamicObject, TrackerError> {
    Ok(serde_json::from_value(serde_json::to_value(job)?)?)
}

fn from_dynamic(mut obj: DynamicObject) -> Result<MPIJob, TrackerError> {
    // List responses omit apiVersion and kind on items
    obj.types.get_or_insert_with(|| TypeMeta {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
    });
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn map_not_found(name: &str, err: kube::Error) -> TrackerError {
    if is_not_found(&err) {
        TrackerError::JobNotFound(name.to_string())
    } else {
        TrackerError::Kube(err)
    }
}

#[async_trait]
impl MpiJobClient for KubeMpiJobClient {
    async fn create(&self, job: &MPIJob) -> Result<MPIJob, TrackerError> {
        let obj = to_dynamic(job)?;
        let created = self.api.create(&PostParams::default(), &obj).await?;
        from_dynamic(created)
    }

    async fn get(&self, name: &str) -> Result<MPIJob, TrackerError> {
        let obj = self
            .api
            .get(name)
            .await
            .map_err(|e| map_not_found(name, e))?;
        from_dynamic(obj)
    }

    async fn list(&self) -> Result<Vec<MPIJob>, TrackerError> {
        let list = self.api.list(&ListParams::default()).await?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn delete(&self, name: &str) -> Result<(), TrackerError> {
        self.api
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_not_found(name, e))?;
        debug!(job = %name, "MPIJob deletion requested");
        Ok(())
    }
}
