//! Tracked pod arena
//!
//! Every admitted pod lives in one record behind its own lock. The map lock
//! is only held to insert, remove or snapshot handles, so a slow reconcile of
//! one pod never blocks admission or deletion of another.

use chrono::{DateTime, Utc};
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::{Pod, PodId};
use hpk_core::domain::status::PodStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which containers of a pod are being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Init containers, one at a time in declaration order
    Init,
    /// Main containers, all at once
    Main,
}

/// Everything the bridge knows about one admitted pod
#[derive(Debug)]
pub struct PodRecord {
    pub pod: Pod,
    pub status: PodStatus,
    pub stage: Stage,
    /// Submitted jobs by container name
    pub jobs: HashMap<String, BatchJob>,
    /// Last status the control plane accepted
    pub last_pushed: Option<PodStatus>,
    /// Last successful status artifact read (or launch) per container
    pub last_read: HashMap<String, DateTime<Utc>>,
    /// Set once the pod was deleted; a cycle holding a stale handle skips it
    pub removed: bool,
}

impl PodRecord {
    pub fn new(pod: Pod) -> Self {
        let stage = if pod.init_containers.is_empty() {
            Stage::Main
        } else {
            Stage::Init
        };

        Self {
            status: PodStatus::pending(&pod),
            pod,
            stage,
            jobs: HashMap::new(),
            last_pushed: None,
            last_read: HashMap::new(),
            removed: false,
        }
    }

    pub fn key(&self) -> String {
        self.pod.key()
    }

    pub fn needs_push(&self) -> bool {
        self.last_pushed.as_ref() != Some(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.phase.is_terminal()
    }
}

pub type RecordHandle = Arc<Mutex<PodRecord>>;

/// Tracked pods indexed by uid
#[derive(Default)]
pub struct PodArena {
    records: Mutex<HashMap<PodId, RecordHandle>>,
}

impl PodArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, returning `None` when its uid is already tracked
    pub async fn insert(&self, record: PodRecord) -> Option<RecordHandle> {
        let mut records = self.records.lock().await;
        let uid = record.pod.uid;
        if records.contains_key(&uid) {
            return None;
        }

        let handle = Arc::new(Mutex::new(record));
        records.insert(uid, Arc::clone(&handle));
        Some(handle)
    }

    pub async fn remove(&self, uid: PodId) -> Option<RecordHandle> {
        self.records.lock().await.remove(&uid)
    }

    #[cfg(test)]
    pub async fn get(&self, uid: PodId) -> Option<RecordHandle> {
        self.records.lock().await.get(&uid).cloned()
    }

    /// Handles of every tracked record at this instant
    pub async fn snapshot(&self) -> Vec<RecordHandle> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<PodId> {
        self.records.lock().await.keys().copied().collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpk_core::domain::container::ContainerSpec;

    #[test]
    fn test_record_stage_follows_init_containers() {
        let plain =
            PodRecord::new(Pod::new("ns", "a").with_container(ContainerSpec::new("c", "busybox")));
        assert_eq!(plain.stage, Stage::Main);
        assert!(plain.status.conditions.initialized);
        assert!(plain.needs_push());

        let with_init = PodRecord::new(
            Pod::new("ns", "b")
                .with_init_container(ContainerSpec::new("i", "busybox"))
                .with_container(ContainerSpec::new("c", "busybox")),
        );
        assert_eq!(with_init.stage, Stage::Init);
        assert!(!with_init.status.conditions.initialized);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_uid() {
        let arena = PodArena::new();
        let pod = Pod::new("ns", "a");

        assert!(arena.insert(PodRecord::new(pod.clone())).await.is_some());
        assert!(arena.insert(PodRecord::new(pod.clone())).await.is_none());
        assert_eq!(arena.len().await, 1);
        assert_eq!(arena.ids().await, vec![pod.uid]);
    }

    #[tokio::test]
    async fn test_removed_record_leaves_snapshot() {
        let arena = PodArena::new();
        let pod = Pod::new("ns", "a");
        arena.insert(PodRecord::new(pod.clone())).await;

        let stale = arena.snapshot().await;
        let handle = arena.remove(pod.uid).await.unwrap();
        handle.lock().await.removed = true;

        assert!(arena.snapshot().await.is_empty());
        assert!(arena.get(pod.uid).await.is_none());
        assert!(stale[0].lock().await.removed);
    }
}
