//! Status reconciliation
//!
//! Tracks admitted pods and walks each one through its lifecycle:
//! - [`arena`]: the tracked pods, indexed by uid
//! - [`observe`]: how a launch or probe result changes a container's state
//! - [`cycle`]: the per-cycle state machine (sequential init stage, then a
//!   concurrent main stage) and status pushes

pub mod arena;
pub mod cycle;
pub mod observe;

pub use cycle::{CycleReport, Reconciler};
pub use observe::StatusPolicy;
