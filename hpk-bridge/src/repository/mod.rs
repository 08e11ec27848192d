//! Repository layer
//!
//! Stateless collaborators the reconciler talks to: the control plane for
//! pod specs and status pushes, and a remote shell for reading status
//! artifacts on the cluster.
//!
//! All repositories are trait-based to enable testing and mocking.

mod exec;
mod pods;

// Re-export traits
pub use exec::RemoteExec;
pub use pods::PodRepository;

// Re-export implementations
pub use exec::{LocalShell, SshSession};
pub use pods::HttpPodRepository;
