//! In-memory collaborators for reconciler and poller tests

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hpk_compute::{ComputeError, PodWorkDir, SubmitError};
use hpk_core::domain::container::ContainerSpec;
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::{Pod, PodId, PodRef};
use hpk_core::domain::status::{PodPhase, PodStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::LaunchError;
use crate::repository::{PodRepository, RemoteExec};
use crate::service::JobLauncher;

/// Fixed reference time for cycles
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// Artifact locations the fakes agree on
pub fn job_for(pod: &PodRef, container: &str) -> BatchJob {
    PodWorkDir::new(format!("/w/{}/{}", pod.namespace, pod.name)).batch_job(container)
}

/// Records launches and cancellations; launches succeed unless told otherwise
///
/// Submitted jobs outlive any reconciler using the launcher, the way jobs on
/// the cluster outlive a bridge restart.
#[derive(Default)]
pub struct FakeLauncher {
    next_job_id: AtomicU64,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    submitted: Mutex<HashMap<(PodId, String), BatchJob>>,
    launched: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    cleaned: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub fn fail(&self, container: &str) {
        self.failing.lock().unwrap().insert(container.to_string());
    }

    /// Makes launches of the container never return
    pub fn hang(&self, container: &str) {
        self.hanging.lock().unwrap().insert(container.to_string());
    }

    /// Every launch attempt, in call order
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobLauncher for FakeLauncher {
    async fn launch(&self, pod: &PodRef, spec: &ContainerSpec) -> Result<BatchJob, LaunchError> {
        self.launched.lock().unwrap().push(spec.name.clone());

        let hangs = self.hanging.lock().unwrap().contains(&spec.name);
        if hangs {
            std::future::pending::<()>().await;
        }

        if self.failing.lock().unwrap().contains(&spec.name) {
            return Err(ComputeError::Submit(SubmitError::MalformedResponse(
                "sbatch: error: Batch job submission failed".to_string(),
            ))
            .into());
        }

        let mut job = job_for(pod, &spec.name);
        job.job_id = Some(1000 + self.next_job_id.fetch_add(1, Ordering::SeqCst));
        self.submitted
            .lock()
            .unwrap()
            .insert((pod.uid, spec.name.clone()), job.clone());
        Ok(job)
    }

    async fn cancel(&self, pod: &PodRef, container: &str) -> Result<Option<u64>> {
        self.cancelled.lock().unwrap().push(container.to_string());
        let removed = self
            .submitted
            .lock()
            .unwrap()
            .remove(&(pod.uid, container.to_string()));
        Ok(removed.and_then(|job| job.job_id))
    }

    async fn cleanup(&self, pod: &PodRef, container: &str) -> Result<()> {
        self.cleaned.lock().unwrap().push(container.to_string());
        self.submitted
            .lock()
            .unwrap()
            .remove(&(pod.uid, container.to_string()));
        Ok(())
    }

    async fn recover(&self, pod: &PodRef, container: &str) -> Result<Option<BatchJob>> {
        Ok(self
            .submitted
            .lock()
            .unwrap()
            .get(&(pod.uid, container.to_string()))
            .cloned())
    }
}

/// Serves status artifacts from memory; unknown artifacts read as empty
#[derive(Default)]
pub struct FakeExec {
    artifacts: Mutex<HashMap<String, Option<String>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeExec {
    pub fn set_status(&self, pod: &Pod, container: &str, content: &str) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(status_path(pod, container), Some(content.to_string()));
    }

    /// Makes every read of the artifact fail
    pub fn set_unreadable(&self, pod: &Pod, container: &str) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(status_path(pod, container), None);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn status_path(pod: &Pod, container: &str) -> String {
    job_for(&pod.pod_ref(), container)
        .status_path
        .to_string_lossy()
        .to_string()
}

#[async_trait]
impl RemoteExec for FakeExec {
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(command.to_string());

        let artifacts = self.artifacts.lock().unwrap();
        match artifacts.iter().find(|(path, _)| command.contains(path.as_str())) {
            Some((_, Some(content))) => Ok(content.clone().into_bytes()),
            Some((_, None)) => anyhow::bail!("ssh: connect to host login01: Connection refused"),
            None => Ok(Vec::new()),
        }
    }
}

/// Never answers, like an ssh session to a host that stopped responding
pub struct StalledExec;

#[async_trait]
impl RemoteExec for StalledExec {
    async fn exec(&self, _command: &str) -> Result<Vec<u8>> {
        std::future::pending().await
    }
}

/// Serves a settable pod list and records accepted status pushes
#[derive(Default)]
pub struct FakeRepository {
    pods: Mutex<Vec<Pod>>,
    listing_fails: AtomicBool,
    failing: AtomicBool,
    pushed: Mutex<Vec<(PodId, PodStatus)>>,
}

impl FakeRepository {
    pub fn set_pods(&self, pods: Vec<Pod>) {
        *self.pods.lock().unwrap() = pods;
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Vec<PodStatus> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, status)| status.clone())
            .collect()
    }

    pub fn pushed_for(&self, uid: PodId) -> Vec<PodPhase> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == uid)
            .map(|(_, status)| status.phase)
            .collect()
    }

    pub fn phases(&self) -> Vec<PodPhase> {
        self.pushed().iter().map(|status| status.phase).collect()
    }
}

#[async_trait]
impl PodRepository for FakeRepository {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            anyhow::bail!("control plane unavailable");
        }
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn update_pod_status(&self, uid: PodId, status: &PodStatus) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("control plane unavailable");
        }
        self.pushed.lock().unwrap().push((uid, status.clone()));
        Ok(())
    }
}
