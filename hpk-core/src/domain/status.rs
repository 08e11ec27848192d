//! Pod and container status domain types
//!
//! Mirrors the Kubernetes status model closely enough for the control plane
//! to consume it directly: a pod phase, the `Scheduled`/`Initialized`/`Ready`
//! conditions and one [`ContainerStatus`] per declared container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::container::ContainerSpec;
use crate::domain::pod::Pod;

pub const REASON_COMPLETED: &str = "Completed";
pub const REASON_ERROR: &str = "Error";
pub const REASON_PENDING_LAUNCH: &str = "PendingLaunch";
pub const REASON_LAUNCH_FAILED: &str = "LaunchFailed";
pub const REASON_STATUS_UNREADABLE: &str = "StatusUnreadable";
pub const REASON_DEADLINE_EXCEEDED: &str = "DeadlineExceeded";

/// Exit code recorded when a container could not be launched at all
pub const EXIT_CODE_LAUNCH_FAILED: i32 = 130;

/// Exit code recorded when a status artifact holds something other than a number
pub const EXIT_CODE_UNKNOWN: i32 = 255;

/// Exit code recorded when a container exceeds its runtime deadline
pub const EXIT_CODE_TIMED_OUT: i32 = 124;

/// Lifecycle phase of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Pod conditions tracked by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodConditions {
    pub scheduled: bool,
    pub initialized: bool,
    pub ready: bool,
}

/// State of a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContainerState {
    Waiting {
        reason: Option<String>,
    },
    Running {
        started_at: DateTime<Utc>,
    },
    Terminated {
        exit_code: i32,
        reason: String,
        message: Option<String>,
        started_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
    },
}

impl ContainerState {
    pub fn waiting() -> Self {
        ContainerState::Waiting {
            reason: Some(REASON_PENDING_LAUNCH.to_string()),
        }
    }

    /// Terminated state derived from an observed exit code
    pub fn exited(exit_code: i32, started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let reason = if exit_code == 0 {
            REASON_COMPLETED
        } else {
            REASON_ERROR
        };
        ContainerState::Terminated {
            exit_code,
            reason: reason.to_string(),
            message: None,
            started_at,
            finished_at: now,
        }
    }

    /// Terminated state for a container the bridge gave up on
    pub fn failed(
        exit_code: i32,
        reason: &str,
        message: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        ContainerState::Terminated {
            exit_code,
            reason: reason.to_string(),
            message: Some(message.into()),
            started_at,
            finished_at: now,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, ContainerState::Waiting { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ContainerState::Terminated { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ContainerState::Terminated { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code() == Some(0)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ContainerState::Running { started_at } => Some(*started_at),
            ContainerState::Terminated { started_at, .. } => *started_at,
            ContainerState::Waiting { .. } => None,
        }
    }
}

/// Status of one declared container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub ready: bool,
    pub job_id: Option<u64>,
}

impl ContainerStatus {
    pub fn waiting(spec: &ContainerSpec) -> Self {
        Self {
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: ContainerState::waiting(),
            ready: false,
            job_id: None,
        }
    }
}

/// Status pushed to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub phase: PodPhase,
    pub conditions: PodConditions,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub init_container_statuses: Vec<ContainerStatus>,
    pub container_statuses: Vec<ContainerStatus>,
}

impl PodStatus {
    /// Initial status of a freshly admitted pod
    ///
    /// A pod without init containers starts out `Initialized`.
    pub fn pending(pod: &Pod) -> Self {
        Self {
            phase: PodPhase::Pending,
            conditions: PodConditions {
                scheduled: true,
                initialized: pod.init_containers.is_empty(),
                ready: false,
            },
            reason: None,
            message: None,
            start_time: None,
            init_container_statuses: pod
                .init_containers
                .iter()
                .map(ContainerStatus::waiting)
                .collect(),
            container_statuses: pod.containers.iter().map(ContainerStatus::waiting).collect(),
        }
    }

    pub fn init_succeeded(&self) -> bool {
        self.init_container_statuses
            .iter()
            .all(|c| c.state.succeeded())
    }

    pub fn init_failed(&self) -> bool {
        self.init_container_statuses
            .iter()
            .any(|c| c.state.is_terminated() && !c.state.succeeded())
    }

    /// Derives phase and conditions from the container states
    ///
    /// Terminal phases are sticky. An init failure fails the pod at once;
    /// otherwise the pod finishes when every main container has terminated,
    /// succeeding only if all of them exited with 0.
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        for status in self
            .init_container_statuses
            .iter_mut()
            .chain(self.container_statuses.iter_mut())
        {
            status.ready = status.state.is_running();
        }

        if self.phase.is_terminal() {
            self.conditions.ready = false;
            return;
        }

        let started = self
            .init_container_statuses
            .iter()
            .chain(self.container_statuses.iter())
            .any(|c| !c.state.is_waiting());
        if started && self.start_time.is_none() {
            self.start_time = Some(now);
        }

        if self.init_failed() {
            self.phase = PodPhase::Failed;
            self.conditions.ready = false;
            return;
        }

        self.conditions.initialized = self.init_succeeded();

        let mains = &self.container_statuses;
        if self.conditions.initialized && mains.iter().all(|c| c.state.is_terminated()) {
            self.phase = if mains.iter().all(|c| c.state.succeeded()) {
                PodPhase::Succeeded
            } else {
                PodPhase::Failed
            };
            self.conditions.ready = false;
            return;
        }

        if started {
            self.phase = PodPhase::Running;
        }

        self.conditions.ready = self.phase == PodPhase::Running
            && self.conditions.initialized
            && mains.iter().all(|c| c.state.is_running());
    }
}
