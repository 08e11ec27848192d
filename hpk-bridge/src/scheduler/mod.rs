//! Scheduler layer for the bridge
//!
//! This layer drives the reconciler: it keeps the tracked pods in sync with
//! the control plane and runs one reconciliation cycle per tick.

pub mod poller;

pub use poller::PodPoller;
