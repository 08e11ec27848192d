//! Core domain types
//!
//! These types describe what the control plane asks for (pods and their
//! containers), what the compute side produces (batch jobs) and what the
//! bridge reports back (pod and container status).

pub mod container;
pub mod image;
pub mod job;
pub mod pod;
pub mod status;
