//! Signed, hash-chained audit log.
//!
//! Append assigns a sequence number, links the entry to its predecessor by
//! hash, and signs the hash with the active RSA-PSS key. [`AuditVerifier`]
//! re-derives every step to detect tampering anywhere in the chain.

mod service;
mod signing;
mod verifier;

pub use service::AuditService;
pub use signing::KeyManager;
pub use verifier::{AuditVerifier, VerificationReport};

use serde::{Deserialize, Serialize};

/// The payload handed to [`AuditService::append`]; storage fields
/// (sequence, hashes, signature) are computed by the service, not the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub originator_id: String,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        originator_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            originator_id: originator_id.into(),
            payload,
        }
    }
}

pub const GENESIS_HASH: &str = "genesis";
