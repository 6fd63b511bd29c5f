//! Audit chain row types: AuditEntry and SigningKey.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the append-only, hash-chained audit log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub entry_id: i64,
    pub event_id: String,
    pub event_timestamp: String,
    pub event_type: String,
    pub originator_id: String,
    pub event_payload_json: String,
    pub sequence_number: i64,
    pub previous_hash: String,
    pub entry_hash: String,
    pub signature: String,
    pub signing_key_id: String,
}

/// A registered RSA-PSS signing key. The private key never appears here -
/// it is kept only on disk under `[audit].key_dir` with 0600 permissions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SigningKey {
    pub key_id: String,
    pub public_key_pem: String,
    pub algorithm: String,
    pub key_size: i64,
    pub created_at: String,
    pub revoked_at: Option<String>,
}

impl SigningKey {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}
