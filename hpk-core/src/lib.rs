//! HPK Core
//!
//! Core types shared by every HPK crate.
//!
//! This crate contains:
//! - Domain types: pods, container specifications, image references, batch jobs
//!   and the Kubernetes-compatible status model
//! - DTOs: payloads exchanged between the bridge and the remote `door` tool

pub mod domain;
pub mod dto;
