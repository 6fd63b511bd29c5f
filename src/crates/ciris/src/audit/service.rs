//! Append path: sequence, hash-chain, sign, store - atomically, in order.

use super::signing::KeyManager;
use super::{AuditEvent, GENESIS_HASH};
use crate::error::Result;
use crate::models::AuditEntry;
use crate::repositories::AuditRepository;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Canonical JSON of the fields that feed `entry_hash`, with sorted keys
/// (the default `serde_json::Map` ordering, since this crate does not enable
/// the `preserve_order` feature).
fn canonical_payload(
    event_id: &str,
    event_timestamp: &str,
    event_type: &str,
    originator_id: &str,
    event_payload: &serde_json::Value,
    sequence_number: i64,
    previous_hash: &str,
) -> String {
    let value = serde_json::json!({
        "event_id": event_id,
        "event_timestamp": event_timestamp,
        "event_type": event_type,
        "originator_id": originator_id,
        "event_payload": event_payload,
        "sequence_number": sequence_number,
        "previous_hash": previous_hash,
    });
    value.to_string()
}

fn hash_hex(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Appends audit events to the hash chain. A single `Mutex` serializes the
/// read-increment-write of `sequence_number` across concurrent callers,
/// complementing (not replacing) the storage-level uniqueness constraint.
pub struct AuditService {
    repo: AuditRepository,
    keys: Mutex<KeyManager>,
    append_lock: Mutex<()>,
}

impl AuditService {
    pub fn new(repo: AuditRepository, keys: KeyManager) -> Arc<Self> {
        Arc::new(Self {
            repo,
            keys: Mutex::new(keys),
            append_lock: Mutex::new(()),
        })
    }

    pub async fn append(&self, event: AuditEvent) -> Result<AuditEntry> {
        let _guard = self.append_lock.lock().await;

        let sequence_number = self.repo.next_sequence_number().await?;
        let previous_hash = match self.repo.latest_entry().await? {
            Some(entry) => entry.entry_hash,
            None => GENESIS_HASH.to_string(),
        };

        let event_id = Uuid::new_v4().to_string();
        let event_timestamp = Utc::now().to_rfc3339();

        let canonical = canonical_payload(
            &event_id,
            &event_timestamp,
            &event.event_type,
            &event.originator_id,
            &event.payload,
            sequence_number,
            &previous_hash,
        );
        let entry_hash = hash_hex(&canonical);

        let keys = self.keys.lock().await;
        let signature = keys.sign(&entry_hash)?;
        let signing_key_id = keys.key_id().to_string();
        drop(keys);

        let entry = AuditEntry {
            entry_id: 0,
            event_id,
            event_timestamp,
            event_type: event.event_type,
            originator_id: event.originator_id,
            event_payload_json: event.payload.to_string(),
            sequence_number,
            previous_hash,
            entry_hash,
            signature,
            signing_key_id,
        };

        self.repo.append(&entry).await?;
        info!(sequence_number, event_type = %entry.event_type, "audit entry appended");
        Ok(entry)
    }

    pub fn repository(&self) -> &AuditRepository {
        &self.repo
    }

    pub async fn rotate_keys(&self) -> Result<()> {
        let mut keys = self.keys.lock().await;
        keys.rotate(&self.repo).await
    }
}

/// Recomputes `entry_hash` for an already-stored entry the same way
/// [`AuditService::append`] would, for use by the verifier.
pub(super) fn recompute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let payload: serde_json::Value = serde_json::from_str(&entry.event_payload_json)?;
    let canonical = canonical_payload(
        &entry.event_id,
        &entry.event_timestamp,
        &entry.event_type,
        &entry.originator_id,
        &payload,
        entry.sequence_number,
        &entry.previous_hash,
    );
    Ok(hash_hex(&canonical))
}
