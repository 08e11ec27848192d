//! Service layer
//!
//! Services wrap the blocking compute side and the status artifact protocol
//! behind async traits the reconciler can drive and tests can replace.

mod launcher;
mod probe;

// Re-export traits
pub use launcher::JobLauncher;

// Re-export implementations
pub use launcher::SlurmLauncher;
pub use probe::{ProbeOutcome, StatusProbe};
