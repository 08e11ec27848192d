//! Pod poller
//!
//! Every tick the poller lists the pods assigned to the bridge, admits the
//! new ones, deletes the ones that disappeared and then runs a
//! reconciliation cycle over everything tracked.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::reconciler::{CycleReport, Reconciler};
use crate::repository::PodRepository;

/// Outcome of one sync with the control plane
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub admitted: usize,
    pub deleted: usize,
}

/// Pod poller that continuously syncs and reconciles pods
pub struct PodPoller {
    config: Config,
    repository: Arc<dyn PodRepository>,
    reconciler: Reconciler,
}

impl PodPoller {
    /// Creates a new pod poller
    pub fn new(config: Config, repository: Arc<dyn PodRepository>, reconciler: Reconciler) -> Self {
        Self {
            config,
            repository,
            reconciler,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting pod poller (interval: {:?})",
            self.config.poll_interval
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for pods");

            let report = self.poll_once().await;
            if report.pushed > 0 {
                info!(
                    "Reconciled {} pod(s), pushed {} status update(s)",
                    report.reconciled, report.pushed
                );
            }
        }
    }

    /// Performs a single sync and reconciliation cycle
    ///
    /// A failed sync only skips admissions and deletions; pods already
    /// tracked are still reconciled.
    pub async fn poll_once(&self) -> CycleReport {
        match self.sync().await {
            Ok(sync) => {
                if sync != SyncReport::default() {
                    info!(
                        "Admitted {} pod(s), deleted {} pod(s)",
                        sync.admitted, sync.deleted
                    );
                }
            }
            Err(e) => error!("Error during pod sync: {:#}", e),
        }

        self.reconciler.run_cycle().await
    }

    /// Brings the tracked pods in line with the control plane
    async fn sync(&self) -> Result<SyncReport> {
        let pods = self
            .repository
            .list_pods()
            .await
            .context("Failed to fetch pods")?;

        let mut report = SyncReport::default();
        let listed: HashSet<_> = pods.iter().map(|pod| pod.uid).collect();

        for uid in self.reconciler.tracked().await {
            if !listed.contains(&uid) {
                if self.reconciler.delete(uid).await {
                    report.deleted += 1;
                } else {
                    warn!("Pod {} vanished during sync", uid);
                }
            }
        }

        for pod in pods {
            if self.reconciler.admit(pod).await {
                report.admitted += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::StatusPolicy;
    use crate::service::StatusProbe;
    use crate::testing::{FakeExec, FakeLauncher, FakeRepository};
    use hpk_core::domain::container::ContainerSpec;
    use hpk_core::domain::pod::Pod;
    use hpk_core::domain::status::PodPhase;
    use std::time::Duration;

    struct Harness {
        launcher: Arc<FakeLauncher>,
        exec: Arc<FakeExec>,
        repository: Arc<FakeRepository>,
        poller: PodPoller,
    }

    fn harness() -> Harness {
        let launcher = Arc::new(FakeLauncher::default());
        let exec = Arc::new(FakeExec::default());
        let repository = Arc::new(FakeRepository::default());
        let reconciler = Reconciler::new(
            launcher.clone(),
            StatusProbe::new(exec.clone()),
            repository.clone(),
            StatusPolicy::new(Duration::from_secs(600), None),
            2,
        );
        let poller = PodPoller::new(Config::default(), repository.clone(), reconciler);
        Harness {
            launcher,
            exec,
            repository,
            poller,
        }
    }

    fn pod(name: &str) -> Pod {
        Pod::new("default", name).with_container(ContainerSpec::new("main", "busybox"))
    }

    #[tokio::test]
    async fn test_sync_admits_and_launches_new_pods() {
        let h = harness();
        let web = pod("web");
        let batch = pod("batch");
        h.repository.set_pods(vec![web.clone(), batch.clone()]);

        let report = h.poller.poll_once().await;

        assert_eq!(report.reconciled, 2);
        assert_eq!(h.launcher.launched().len(), 2);
        assert_eq!(
            h.repository.pushed_for(web.uid),
            vec![PodPhase::Pending, PodPhase::Running]
        );
    }

    #[tokio::test]
    async fn test_vanished_pod_is_deleted() {
        let h = harness();
        let web = pod("web");
        h.repository.set_pods(vec![web.clone()]);
        h.poller.poll_once().await;

        h.repository.set_pods(Vec::new());
        let report = h.poller.poll_once().await;

        assert_eq!(report, CycleReport::default());
        assert_eq!(h.launcher.cancelled(), vec!["main"]);
        assert!(h.poller.reconciler.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_still_reconciles_tracked_pods() {
        let h = harness();
        let web = pod("web");
        h.repository.set_pods(vec![web.clone()]);
        h.poller.poll_once().await;

        h.repository.set_listing_fails(true);
        h.exec.set_status(&web, "main", "0\n");
        h.poller.poll_once().await;

        assert_eq!(
            h.repository.pushed_for(web.uid),
            vec![PodPhase::Pending, PodPhase::Running, PodPhase::Succeeded]
        );
        assert!(h.launcher.cancelled().is_empty());
    }
}
