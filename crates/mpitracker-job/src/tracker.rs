//! Job tracker facade
//!
//! Submits job templates as MPIJobs and answers state, info and wait
//! queries by reading them back. All cluster access goes through an
//! `MpiJobClient`.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mpitracker_common::{Error, JobControlAction, JobInfo, JobState, JobTemplate};
use mpitracker_mpijob::{compile_mpijob, job_info_from_mpijob, job_state_from_conditions, MPIJob};

use crate::client::{KubeMpiJobClient, MpiJobClient};
use crate::config::TrackerConfig;
use crate::error::TrackerError;

/// Tracks MPIJobs submitted from generic job templates
pub struct MpiJobTracker<C = KubeMpiJobClient> {
    client: C,
    config: TrackerConfig,
}

impl MpiJobTracker<KubeMpiJobClient> {
    /// Connect to the cluster described by `config`
    pub async fn connect(config: TrackerConfig) -> Result<Self, TrackerError> {
        let client = KubeMpiJobClient::connect(&config).await?;
        Ok(Self::new(client, config))
    }
}

impl<C: MpiJobClient> MpiJobTracker<C> {
    pub fn new(client: C, config: TrackerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Compile and submit a job template, returning the generated job name
    pub async fn add_job(&self, jt: &JobTemplate) -> Result<String, TrackerError> {
        let job = compile_mpijob(jt, &self.config.namespace, &self.config.generate_name)?;
        let created = self.client.create(&job).await?;
        let name = created.metadata.name.ok_or(TrackerError::MissingName)?;

        info!(
            job = %name,
            namespace = %self.config.namespace,
            image = %jt.job_category,
            "submitted MPIJob"
        );
        Ok(name)
    }

    /// Submit a job template and block until the job has finished.
    ///
    /// Waits at most the configured maximum wait time.
    pub async fn add_and_wait(
        &self,
        jt: &JobTemplate,
        cancel: &CancellationToken,
    ) -> Result<String, TrackerError> {
        let name = self.add_job(jt).await?;
        self.poll(&name, self.config.max_wait, cancel, is_finished).await?;
        Ok(name)
    }

    /// Submit one job per index in `begin..=end`, advancing by `step`.
    ///
    /// The operator has no native array jobs, so every task is an ordinary
    /// MPIJob and `max_parallel` is not enforced. The returned array id
    /// lists the created job names; `list_array_jobs` decodes it. Fails on
    /// the first rejected submission, leaving earlier tasks running.
    pub async fn add_array_job(
        &self,
        jt: &JobTemplate,
        begin: i64,
        end: i64,
        step: i64,
        max_parallel: i64,
    ) -> Result<String, TrackerError> {
        if step <= 0 {
            return Err(Error::validation_for_field("step", "must be positive").into());
        }
        if begin > end {
            return Err(Error::validation_for_field("end", "must not be less than begin").into());
        }

        let mut names = Vec::new();
        let mut index = begin;
        while index <= end {
            names.push(self.add_job(jt).await?);
            index = match index.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        info!(
            tasks = names.len(),
            begin,
            end,
            step,
            max_parallel,
            "submitted array job as single MPIJobs"
        );
        Ok(serde_json::to_string(&names)?)
    }

    /// Job names behind an array id returned by `add_array_job`
    pub fn list_array_jobs(&self, array_id: &str) -> Result<Vec<String>, TrackerError> {
        serde_json::from_str(array_id).map_err(|e| {
            Error::validation_for_field("arrayJobId", format!("not an array job id: {e}")).into()
        })
    }

    /// Names of all MPIJobs in the namespace
    pub async fn list_jobs(&self) -> Result<Vec<String>, TrackerError> {
        let jobs = self.client.list().await?;
        Ok(jobs.into_iter().filter_map(|job| job.metadata.name).collect())
    }

    /// State of a job and a free-form substate
    pub async fn job_state(&self, id: &str) -> Result<(JobState, String), TrackerError> {
        let job = self.client.get(id).await?;
        Ok(job_state_from_conditions(job.conditions()))
    }

    pub async fn job_info(&self, id: &str) -> Result<JobInfo, TrackerError> {
        let job = self.client.get(id).await?;
        Ok(job_info_from_mpijob(&job))
    }

    /// Apply a control action.
    ///
    /// MPIJobs cannot be suspended or held, so only `Terminate` is accepted.
    /// It deletes the job.
    pub async fn job_control(
        &self,
        id: &str,
        action: JobControlAction,
    ) -> Result<(), TrackerError> {
        match action {
            JobControlAction::Terminate => self.delete_job(id).await,
            JobControlAction::Suspend
            | JobControlAction::Resume
            | JobControlAction::Hold
            | JobControlAction::Release => {
                warn!(job = %id, action = %action, "rejecting unsupported job control action");
                Err(TrackerError::UnsupportedOperation(action))
            }
        }
    }

    /// Block until the job is in one of `states`.
    ///
    /// An empty `states` waits for any terminal state. Returns the state
    /// reached; fails with `WaitTimeout` once `timeout` elapses and with
    /// `Cancelled` when `cancel` fires.
    pub async fn wait(
        &self,
        id: &str,
        timeout: Duration,
        states: &[JobState],
        cancel: &CancellationToken,
    ) -> Result<JobState, TrackerError> {
        let reached = |job: &MPIJob| {
            let (state, _) = job_state_from_conditions(job.conditions());
            if states.is_empty() {
                state.is_terminal()
            } else {
                states.contains(&state)
            }
        };
        let job = self.poll(id, timeout, cancel, reached).await?;
        Ok(job_state_from_conditions(job.conditions()).0)
    }

    /// Delete a job and its pods
    pub async fn delete_job(&self, id: &str) -> Result<(), TrackerError> {
        self.client.delete(id).await?;
        info!(job = %id, namespace = %self.config.namespace, "deleted MPIJob");
        Ok(())
    }

    /// Job categories are launcher images, and any image is accepted
    pub fn list_job_categories(&self) -> Vec<String> {
        Vec::new()
    }

    /// Re-read the job every poll interval until `done` holds
    async fn poll<F>(
        &self,
        id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut done: F,
    ) -> Result<MPIJob, TrackerError>
    where
        F: FnMut(&MPIJob) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let timed_out = || {
            warn!(job = %id, timeout = ?timeout, "wait timed out");
            TrackerError::WaitTimeout {
                job: id.to_string(),
                timeout,
            }
        };

        loop {
            // A slow API server must not hold off cancellation or the deadline
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TrackerError::Cancelled(id.to_string()));
                }
                _ = tokio::time::sleep_until(deadline) => return Err(timed_out()),
                job = self.client.get(id) => job?,
            };
            if done(&job) {
                return Ok(job);
            }
            debug!(job = %id, "condition not yet met, polling again");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TrackerError::Cancelled(id.to_string()));
                }
                _ = tokio::time::sleep_until(deadline) => return Err(timed_out()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

fn is_finished(job: &MPIJob) -> bool {
    let completed = job
        .status
        .as_ref()
        .is_some_and(|s| s.completion_time.is_some());
    completed || job_state_from_conditions(job.conditions()).0.is_terminal()
}
