//! Container state transitions
//!
//! A reconcile produces observations (a launch result or a status probe) and
//! folds each one into the pod record here. Phase derivation is left to
//! [`PodStatus::recompute`](hpk_core::domain::status::PodStatus::recompute).

use chrono::{DateTime, TimeDelta, Utc};
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::status::{
    ContainerState, EXIT_CODE_LAUNCH_FAILED, EXIT_CODE_TIMED_OUT, EXIT_CODE_UNKNOWN,
    REASON_DEADLINE_EXCEEDED, REASON_ERROR, REASON_LAUNCH_FAILED, REASON_STATUS_UNREADABLE,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LaunchError, StateInvariantError, StatusReadError};
use crate::reconciler::arena::PodRecord;
use crate::service::ProbeOutcome;

/// Init or main container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Init,
    Main,
}

/// Result of acting on one container during a cycle
#[derive(Debug)]
pub enum Observation {
    Launched(Result<BatchJob, LaunchError>),
    Probed(Result<ProbeOutcome, StatusReadError>),
}

/// When the bridge stops waiting for a status artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Longest stretch of failed status reads tolerated
    pub stale_after: TimeDelta,
    /// Longest runtime tolerated without an exit code
    pub job_timeout: Option<TimeDelta>,
    /// Bound on a single status read, counted as a failed read when hit
    pub read_timeout: Duration,
    /// Bound on a single launch, counted as a failed launch when hit
    pub launch_timeout: Duration,
}

impl StatusPolicy {
    pub fn new(stale_after: Duration, job_timeout: Option<Duration>) -> Self {
        Self {
            stale_after: to_delta(stale_after),
            job_timeout: job_timeout.map(to_delta),
            read_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(900),
        }
    }

    pub fn with_timeouts(mut self, read_timeout: Duration, launch_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.launch_timeout = launch_timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.status_stale_after, config.job_timeout)
            .with_timeouts(config.status_read_timeout, config.launch_timeout)
    }

    fn deadline_passed(&self, started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self.job_timeout, started_at) {
            (Some(timeout), Some(started_at)) => now - started_at >= timeout,
            _ => false,
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Folds one observation into the record
///
/// Observations for containers that are unknown, already terminated or not
/// yet launched are rejected and leave the record untouched.
pub fn apply(
    record: &mut PodRecord,
    kind: ContainerKind,
    name: &str,
    observation: Observation,
    policy: &StatusPolicy,
    now: DateTime<Utc>,
) -> Result<(), StateInvariantError> {
    let pod = record.key();
    let statuses = match kind {
        ContainerKind::Init => &mut record.status.init_container_statuses,
        ContainerKind::Main => &mut record.status.container_statuses,
    };
    let status = statuses.iter_mut().find(|c| c.name == name).ok_or_else(|| {
        StateInvariantError::UnknownContainer {
            pod: pod.clone(),
            container: name.to_string(),
        }
    })?;

    if status.state.is_terminated() {
        return Err(StateInvariantError::AlreadyTerminated {
            pod,
            container: name.to_string(),
        });
    }
    let started_at = status.state.started_at();

    match observation {
        Observation::Launched(Ok(job)) => {
            status.state = ContainerState::Running { started_at: now };
            status.job_id = job.job_id;
            record.last_read.insert(name.to_string(), now);
            record.jobs.insert(name.to_string(), job);
            info!("Container {} of pod {} is running", name, pod);
        }
        Observation::Launched(Err(e)) => {
            warn!("Failed to launch container {} of pod {}: {}", name, pod, e);
            status.state = ContainerState::failed(
                EXIT_CODE_LAUNCH_FAILED,
                REASON_LAUNCH_FAILED,
                e.to_string(),
                None,
                now,
            );
        }
        Observation::Probed(_) if status.state.is_waiting() => {
            return Err(StateInvariantError::NotLaunched {
                pod,
                container: name.to_string(),
            });
        }
        Observation::Probed(Ok(ProbeOutcome::Exited(code))) => {
            info!(
                "Container {} of pod {} exited with code {}",
                name, pod, code
            );
            status.state = ContainerState::exited(code, started_at, now);
        }
        Observation::Probed(Ok(ProbeOutcome::Unparseable(content))) => {
            warn!(
                "Container {} of pod {} left an unreadable exit status: {:?}",
                name, pod, content
            );
            status.state = ContainerState::failed(
                EXIT_CODE_UNKNOWN,
                REASON_ERROR,
                format!("unparseable exit status {:?}", content),
                started_at,
                now,
            );
        }
        Observation::Probed(Ok(ProbeOutcome::Running)) => {
            record.last_read.insert(name.to_string(), now);
            if policy.deadline_passed(started_at, now) {
                warn!("Container {} of pod {} exceeded its deadline", name, pod);
                status.state = ContainerState::failed(
                    EXIT_CODE_TIMED_OUT,
                    REASON_DEADLINE_EXCEEDED,
                    "no exit status before the job timeout",
                    started_at,
                    now,
                );
            }
        }
        Observation::Probed(Err(e)) => {
            let last_read = record
                .last_read
                .get(name)
                .copied()
                .or(started_at)
                .unwrap_or(now);

            if now - last_read > policy.stale_after {
                warn!(
                    "Giving up on container {} of pod {}, status unreadable since {}: {}",
                    name, pod, last_read, e
                );
                status.state = ContainerState::failed(
                    EXIT_CODE_UNKNOWN,
                    REASON_STATUS_UNREADABLE,
                    e.to_string(),
                    started_at,
                    now,
                );
            } else if policy.deadline_passed(started_at, now) {
                warn!("Container {} of pod {} exceeded its deadline", name, pod);
                status.state = ContainerState::failed(
                    EXIT_CODE_TIMED_OUT,
                    REASON_DEADLINE_EXCEEDED,
                    e.to_string(),
                    started_at,
                    now,
                );
            } else {
                debug!("{}, treating container as running", e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpk_compute::{ComputeError, PodWorkDir, SubmitError};
    use hpk_core::domain::container::ContainerSpec;
    use hpk_core::domain::pod::Pod;

    fn record() -> PodRecord {
        PodRecord::new(
            Pod::new("ns", "pod")
                .with_init_container(ContainerSpec::new("setup", "busybox"))
                .with_container(ContainerSpec::new("main", "busybox")),
        )
    }

    fn policy() -> StatusPolicy {
        StatusPolicy::new(Duration::from_secs(600), Some(Duration::from_secs(3600)))
    }

    fn launched(name: &str) -> Observation {
        let mut job = PodWorkDir::new("/w").batch_job(name);
        job.job_id = Some(7);
        Observation::Launched(Ok(job))
    }

    fn unreadable(name: &str) -> Observation {
        Observation::Probed(Err(StatusReadError {
            container: name.to_string(),
            message: "connection reset".to_string(),
        }))
    }

    fn main_state(record: &PodRecord) -> &ContainerState {
        &record.status.container_statuses[0].state
    }

    #[test]
    fn test_launch_starts_container() {
        let mut record = record();
        let now = Utc::now();

        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), now).unwrap();

        assert_eq!(main_state(&record), &ContainerState::Running { started_at: now });
        assert_eq!(record.status.container_statuses[0].job_id, Some(7));
        assert!(record.jobs.contains_key("main"));
    }

    #[test]
    fn test_launch_failure_terminates_with_launch_code() {
        let mut record = record();
        let err = LaunchError::Compute(ComputeError::Submit(SubmitError::MalformedResponse(
            "?".to_string(),
        )));

        apply(
            &mut record,
            ContainerKind::Init,
            "setup",
            Observation::Launched(Err(err)),
            &policy(),
            Utc::now(),
        )
        .unwrap();

        let state = &record.status.init_container_statuses[0].state;
        assert_eq!(state.exit_code(), Some(EXIT_CODE_LAUNCH_FAILED));
        assert!(matches!(state, ContainerState::Terminated { reason, .. } if reason == REASON_LAUNCH_FAILED));
    }

    #[test]
    fn test_unparseable_status_is_an_error() {
        let mut record = record();
        let now = Utc::now();
        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), now).unwrap();

        let garbage = Observation::Probed(Ok(ProbeOutcome::Unparseable("oops".to_string())));
        apply(&mut record, ContainerKind::Main, "main", garbage, &policy(), now).unwrap();

        assert_eq!(main_state(&record).exit_code(), Some(EXIT_CODE_UNKNOWN));
    }

    #[test]
    fn test_unreadable_status_within_threshold_keeps_running() {
        let mut record = record();
        let t0 = Utc::now();
        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), t0).unwrap();

        let later = t0 + TimeDelta::minutes(9);
        apply(&mut record, ContainerKind::Main, "main", unreadable("main"), &policy(), later)
            .unwrap();

        assert!(main_state(&record).is_running());
    }

    #[test]
    fn test_stale_status_terminates_container() {
        let mut record = record();
        let t0 = Utc::now();
        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), t0).unwrap();

        let later = t0 + TimeDelta::minutes(11);
        apply(&mut record, ContainerKind::Main, "main", unreadable("main"), &policy(), later)
            .unwrap();

        match main_state(&record) {
            ContainerState::Terminated {
                exit_code, reason, ..
            } => {
                assert_eq!(*exit_code, EXIT_CODE_UNKNOWN);
                assert_eq!(reason, REASON_STATUS_UNREADABLE);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_successful_read_resets_staleness_clock() {
        let mut record = record();
        let t0 = Utc::now();
        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), t0).unwrap();

        let t1 = t0 + TimeDelta::minutes(8);
        let running = Observation::Probed(Ok(ProbeOutcome::Running));
        apply(&mut record, ContainerKind::Main, "main", running, &policy(), t1).unwrap();

        let t2 = t0 + TimeDelta::minutes(16);
        apply(&mut record, ContainerKind::Main, "main", unreadable("main"), &policy(), t2).unwrap();

        assert!(main_state(&record).is_running());
    }

    #[test]
    fn test_job_timeout_terminates_container() {
        let mut record = record();
        let t0 = Utc::now();
        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), t0).unwrap();

        let late = t0 + TimeDelta::hours(2);
        let running = Observation::Probed(Ok(ProbeOutcome::Running));
        apply(&mut record, ContainerKind::Main, "main", running, &policy(), late).unwrap();

        assert_eq!(main_state(&record).exit_code(), Some(EXIT_CODE_TIMED_OUT));
    }

    #[test]
    fn test_invariant_violations_are_rejected() {
        let mut record = record();
        let now = Utc::now();

        let probe_before_launch = Observation::Probed(Ok(ProbeOutcome::Exited(0)));
        assert!(matches!(
            apply(&mut record, ContainerKind::Main, "main", probe_before_launch, &policy(), now),
            Err(StateInvariantError::NotLaunched { .. })
        ));

        assert!(matches!(
            apply(&mut record, ContainerKind::Main, "ghost", launched("ghost"), &policy(), now),
            Err(StateInvariantError::UnknownContainer { .. })
        ));

        apply(&mut record, ContainerKind::Main, "main", launched("main"), &policy(), now).unwrap();
        let exited = Observation::Probed(Ok(ProbeOutcome::Exited(0)));
        apply(&mut record, ContainerKind::Main, "main", exited, &policy(), now).unwrap();

        let again = Observation::Probed(Ok(ProbeOutcome::Exited(1)));
        assert!(matches!(
            apply(&mut record, ContainerKind::Main, "main", again, &policy(), now),
            Err(StateInvariantError::AlreadyTerminated { .. })
        ));
        assert!(main_state(&record).succeeded());
    }
}
