//! Container payload decoding
//!
//! The bridge hands containers over as base64 encoded JSON so they survive
//! a trip through a remote shell command line unquoted.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use hpk_core::dto::door::DoorContainer;

/// Decodes a container passed on the command line
pub fn decode(encoded: &str) -> Result<DoorContainer> {
    let json = STANDARD
        .decode(encoded.trim())
        .context("Container payload is not valid base64")?;

    serde_json::from_slice(&json).context("Container payload is not a valid container JSON")
}
