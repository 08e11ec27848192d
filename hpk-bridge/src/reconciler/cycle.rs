//! Reconciliation cycle
//!
//! One cycle visits every tracked pod that has not reached a terminal phase:
//! - Init stage: the first unfinished init container is launched or probed.
//!   A success moves on to the next one within the same cycle, a failure
//!   fails the pod and nothing after it is ever started.
//! - Main stage: every waiting main container is launched and every running
//!   one probed, all concurrently.
//!
//! Afterwards the pod status is pushed when it differs from what the control
//! plane last accepted.
//!
//! Launches and status reads are bounded by the policy timeouts. A read that
//! hangs counts as a failed read, so staleness still ends it eventually.

use chrono::{DateTime, Utc};
use hpk_client::ClientError;
use hpk_core::domain::container::ContainerSpec;
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::{Pod, PodId, PodRef};
use hpk_core::domain::status::{ContainerState, REASON_COMPLETED, REASON_ERROR};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::error::{LaunchError, StateInvariantError, StatusReadError};
use crate::reconciler::arena::{PodArena, PodRecord, RecordHandle, Stage};
use crate::reconciler::observe::{self, ContainerKind, Observation, StatusPolicy};
use crate::repository::PodRepository;
use crate::service::{JobLauncher, ProbeOutcome, StatusProbe};

/// What a cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Pods whose containers were advanced
    pub reconciled: usize,
    /// Status pushes accepted by the control plane
    pub pushed: usize,
}

/// Drives tracked pods through their lifecycle
#[derive(Clone)]
pub struct Reconciler {
    arena: Arc<PodArena>,
    launcher: Arc<dyn JobLauncher>,
    probe: StatusProbe,
    repository: Arc<dyn PodRepository>,
    policy: StatusPolicy,
    permits: Arc<Semaphore>,
}

impl Reconciler {
    pub fn new(
        launcher: Arc<dyn JobLauncher>,
        probe: StatusProbe,
        repository: Arc<dyn PodRepository>,
        policy: StatusPolicy,
        max_parallel_pods: usize,
    ) -> Self {
        Self {
            arena: Arc::new(PodArena::new()),
            launcher,
            probe,
            repository,
            policy,
            permits: Arc::new(Semaphore::new(max_parallel_pods)),
        }
    }

    /// Starts tracking a pod and pushes its initial status
    ///
    /// # Returns
    /// `false` when the pod was already tracked
    pub async fn admit(&self, pod: Pod) -> bool {
        self.admit_at(pod, Utc::now()).await
    }

    /// Admits a pod as if the current time were `now`
    ///
    /// Containers whose job was submitted before the bridge restarted are
    /// adopted as running instead of being launched a second time.
    pub async fn admit_at(&self, pod: Pod, now: DateTime<Utc>) -> bool {
        let key = pod.key();
        let (inits, mains) = (pod.init_containers.len(), pod.containers.len());

        let Some(handle) = self.arena.insert(PodRecord::new(pod)).await else {
            return false;
        };

        let mut record = handle.lock().await;
        let adopted = self.adopt_jobs(&mut record, now).await;
        if adopted > 0 {
            record.status.recompute(now);
        }

        info!(
            "Admitted pod {} ({} init, {} main containers, {} adopted)",
            key, inits, mains, adopted
        );
        self.push_if_changed(&mut record).await;
        true
    }

    /// Marks every container with a surviving job as running
    ///
    /// # Returns
    /// How many containers were adopted
    async fn adopt_jobs(&self, record: &mut PodRecord, now: DateTime<Utc>) -> usize {
        let pod = record.pod.pod_ref();
        let containers: Vec<(ContainerKind, String)> = record
            .pod
            .init_containers
            .iter()
            .map(|c| (ContainerKind::Init, c.name.clone()))
            .chain(
                record
                    .pod
                    .containers
                    .iter()
                    .map(|c| (ContainerKind::Main, c.name.clone())),
            )
            .collect();

        let mut adopted = 0;
        for (kind, name) in containers {
            let lookup = time::timeout(
                self.policy.launch_timeout,
                self.launcher.recover(&pod, &name),
            )
            .await;

            let job = match lookup {
                Ok(Ok(Some(job))) => job,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    warn!(
                        "Failed to look up previous job of container {} of pod {}: {:#}",
                        name,
                        record.key(),
                        e
                    );
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Looking up previous job of container {} of pod {} timed out",
                        name,
                        record.key()
                    );
                    continue;
                }
            };

            let applied = observe::apply(
                record,
                kind,
                &name,
                Observation::Launched(Ok(job)),
                &self.policy,
                now,
            );
            match applied {
                Ok(()) => adopted += 1,
                Err(e) => self.report_invariant(e),
            }
        }
        adopted
    }

    /// Stops tracking a pod, cancelling its jobs and removing their artifacts
    ///
    /// Only jobs known to have written an exit status are spared the cancel.
    /// Waits for an in-flight reconcile of the pod to finish first.
    ///
    /// # Returns
    /// `false` when the pod was not tracked
    pub async fn delete(&self, uid: PodId) -> bool {
        let Some(handle) = self.arena.remove(uid).await else {
            return false;
        };

        let mut record = handle.lock().await;
        record.removed = true;
        let pod = record.pod.pod_ref();

        for status in record
            .status
            .init_container_statuses
            .iter()
            .chain(record.status.container_statuses.iter())
        {
            let result = if job_finished(&status.state) {
                self.launcher
                    .cleanup(&pod, &status.name)
                    .await
                    .map(|_| None)
            } else {
                self.launcher.cancel(&pod, &status.name).await
            };

            match result {
                Ok(Some(job_id)) => debug!("Cancelled job {} of {}", job_id, status.name),
                Ok(None) => debug!("Removed artifacts of {}", status.name),
                Err(e) => warn!(
                    "Failed to cancel container {} of pod {}: {:#}",
                    status.name,
                    record.key(),
                    e
                ),
            }
        }

        info!("Deleted pod {}", record.key());
        true
    }

    /// Uids of every tracked pod
    pub async fn tracked(&self) -> Vec<PodId> {
        self.arena.ids().await
    }

    #[cfg(test)]
    pub fn arena(&self) -> &PodArena {
        &self.arena
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one cycle as if the current time were `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let mut tasks = JoinSet::new();

        for handle in self.arena.snapshot().await {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let this = self.clone();
            tasks.spawn(async move {
                let report = this.reconcile(handle, now).await;
                drop(permit);
                report
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pod_report) => {
                    report.reconciled += pod_report.reconciled;
                    report.pushed += pod_report.pushed;
                }
                Err(e) => warn!("Reconcile task panicked: {}", e),
            }
        }
        report
    }

    async fn reconcile(&self, handle: RecordHandle, now: DateTime<Utc>) -> CycleReport {
        let mut record = handle.lock().await;
        let mut report = CycleReport::default();
        if record.removed {
            return report;
        }

        if !record.is_terminal() {
            if record.stage == Stage::Init {
                self.advance_init(&mut record, now).await;
            }
            if record.stage == Stage::Main {
                self.advance_main(&mut record, now).await;
            }

            record.status.recompute(now);
            if record.is_terminal() {
                info!("Pod {} finished: {}", record.key(), record.status.phase);
            }
            report.reconciled = 1;
        }

        if self.push_if_changed(&mut record).await {
            report.pushed = 1;
        }
        report
    }

    async fn advance_init(&self, record: &mut PodRecord, now: DateTime<Utc>) {
        loop {
            if record.status.init_failed() {
                return;
            }

            let Some(index) = record
                .status
                .init_container_statuses
                .iter()
                .position(|c| !c.state.is_terminated())
            else {
                record.stage = Stage::Main;
                info!("Pod {} initialized", record.key());
                return;
            };

            let name = record.status.init_container_statuses[index].name.clone();
            let observation = if record.status.init_container_statuses[index].state.is_waiting() {
                let Some(spec) = effective_spec(&record.pod, &record.pod.init_containers, &name)
                else {
                    return;
                };
                let pod = record.pod.pod_ref();
                Observation::Launched(
                    launch_within(self.launcher.as_ref(), &pod, &spec, self.policy.launch_timeout)
                        .await,
                )
            } else {
                let Some(job) = record.jobs.get(&name).cloned() else {
                    self.report_invariant(StateInvariantError::NotLaunched {
                        pod: record.key(),
                        container: name,
                    });
                    return;
                };
                Observation::Probed(read_within(&self.probe, &job, self.policy.read_timeout).await)
            };

            let applied = observe::apply(
                record,
                ContainerKind::Init,
                &name,
                observation,
                &self.policy,
                now,
            );
            if let Err(e) = applied {
                self.report_invariant(e);
                return;
            }

            // only a finished, successful init container lets the next one start
            if !record.status.init_container_statuses[index].state.succeeded() {
                return;
            }
        }
    }

    async fn advance_main(&self, record: &mut PodRecord, now: DateTime<Utc>) {
        let pod = record.pod.pod_ref();
        let mut tasks = JoinSet::new();

        for status in &record.status.container_statuses {
            let name = status.name.clone();

            if status.state.is_waiting() {
                let Some(spec) = effective_spec(&record.pod, &record.pod.containers, &name) else {
                    continue;
                };
                let launcher = Arc::clone(&self.launcher);
                let pod = pod.clone();
                let limit = self.policy.launch_timeout;
                tasks.spawn(async move {
                    let result = launch_within(launcher.as_ref(), &pod, &spec, limit).await;
                    (name, Observation::Launched(result))
                });
            } else if status.state.is_running() {
                let Some(job) = record.jobs.get(&name).cloned() else {
                    self.report_invariant(StateInvariantError::NotLaunched {
                        pod: record.key(),
                        container: name,
                    });
                    continue;
                };
                let probe = self.probe.clone();
                let limit = self.policy.read_timeout;
                tasks.spawn(async move {
                    let result = read_within(&probe, &job, limit).await;
                    (name, Observation::Probed(result))
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, observation)) => {
                    let applied = observe::apply(
                        record,
                        ContainerKind::Main,
                        &name,
                        observation,
                        &self.policy,
                        now,
                    );
                    if let Err(e) = applied {
                        self.report_invariant(e);
                    }
                }
                Err(e) => warn!("Container task of pod {} panicked: {}", record.key(), e),
            }
        }
    }

    /// Pushes the record's status unless the control plane already has it
    ///
    /// # Returns
    /// `true` when a push was accepted
    async fn push_if_changed(&self, record: &mut PodRecord) -> bool {
        if !record.needs_push() {
            return false;
        }

        match self
            .repository
            .update_pod_status(record.pod.uid, &record.status)
            .await
        {
            Ok(()) => {
                debug!(
                    "Pushed status of pod {}: phase={}",
                    record.key(),
                    record.status.phase
                );
                record.last_pushed = Some(record.status.clone());
                true
            }
            // either way the push is retried next cycle
            Err(e) => {
                if rejected(&e) {
                    error!("Control plane rejected status of pod {}: {:#}", record.key(), e);
                } else {
                    warn!("Failed to push status of pod {}: {:#}", record.key(), e);
                }
                false
            }
        }
    }

    fn report_invariant(&self, error: StateInvariantError) {
        warn!("Dropping observation: {}", error);
    }
}

/// Whether the control plane answered a push with a non-retryable error
fn rejected(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ClientError>()
        .is_some_and(|e| !e.is_transient())
}

/// Launches a container, giving up after `limit`
///
/// The backend keeps working on a launch that timed out; a job it still
/// submits is cancelled with the pod.
async fn launch_within(
    launcher: &dyn JobLauncher,
    pod: &PodRef,
    spec: &ContainerSpec,
    limit: Duration,
) -> Result<BatchJob, LaunchError> {
    match time::timeout(limit, launcher.launch(pod, spec)).await {
        Ok(result) => result,
        Err(_) => Err(LaunchError::TimedOut(limit)),
    }
}

/// Reads a status artifact, counting a read slower than `limit` as failed
async fn read_within(
    probe: &StatusProbe,
    job: &BatchJob,
    limit: Duration,
) -> Result<ProbeOutcome, StatusReadError> {
    match time::timeout(limit, probe.probe(job)).await {
        Ok(result) => result,
        Err(_) => Err(StatusReadError {
            container: job.container_name.clone(),
            message: format!("status read timed out after {:?}", limit),
        }),
    }
}

/// Whether the container's job wrote an exit status, so nothing is left to cancel
fn job_finished(state: &ContainerState) -> bool {
    matches!(
        state,
        ContainerState::Terminated { reason, .. } if reason == REASON_COMPLETED || reason == REASON_ERROR
    )
}

/// Spec of `name` among `containers`, with the pod annotations folded in
fn effective_spec(pod: &Pod, containers: &[ContainerSpec], name: &str) -> Option<ContainerSpec> {
    containers
        .iter()
        .find(|c| c.name == name)
        .map(|c| pod.effective_spec(c))
}
