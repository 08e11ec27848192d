//! Data Transfer Objects
//!
//! Payloads exchanged between the bridge and the remote `door` tool.

pub mod door;
