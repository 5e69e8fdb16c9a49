//! Reserved `system` channel payloads.
//!
//! Key announcements travel as ordinary chat messages addressed to / sent
//! from [`SYSTEM_SENDER`], with a JSON body discriminated by `type`. The
//! body is decoded once at the transport boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sender id the hub stamps on system-channel traffic.
pub const SYSTEM_SENDER: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SystemMessage {
    /// A user's base64 SPKI public key.
    #[serde(rename_all = "camelCase")]
    PublicKey { user_id: String, public_key: String },
}

#[derive(Debug, Error)]
#[error("Not a system message: {0}")]
pub struct SystemDecodeError(#[from] serde_json::Error);

impl SystemMessage {
    pub fn decode(payload: &str) -> Result<Self, SystemDecodeError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
