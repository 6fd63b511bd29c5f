//! Audit repository: the append-only, hash-chained log and its signing keys.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::{AuditEntry, SigningKey};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AuditRepository {
    db: Arc<Database>,
}

impl AuditRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The append protocol calls this, under the same connection that will
    /// perform the insert, to compute the next `sequence_number`.
    pub async fn next_sequence_number(&self) -> Result<i64> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(sequence_number) FROM audit_log_v2")
                .fetch_one(self.db.pool())
                .await
                .map_err(|e| {
                    CirisError::Database(format!("failed to read max sequence number: {}", e))
                })?;
        Ok(row.0.unwrap_or(0) + 1)
    }

    pub async fn latest_entry(&self) -> Result<Option<AuditEntry>> {
        sqlx::query_as::<_, AuditEntry>(
            "SELECT * FROM audit_log_v2 ORDER BY sequence_number DESC LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to load latest audit entry: {}", e)))
    }

    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log_v2 (event_id, event_timestamp, event_type, originator_id,
                event_payload_json, sequence_number, previous_hash, entry_hash, signature, signing_key_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.event_id)
        .bind(&entry.event_timestamp)
        .bind(&entry.event_type)
        .bind(&entry.originator_id)
        .bind(&entry.event_payload_json)
        .bind(entry.sequence_number)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .bind(&entry.signature)
        .bind(&entry.signing_key_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to append audit entry: {}", e)))?;

        Ok(())
    }

    pub async fn find_by_sequence(&self, sequence_number: i64) -> Result<Option<AuditEntry>> {
        sqlx::query_as::<_, AuditEntry>("SELECT * FROM audit_log_v2 WHERE sequence_number = ?")
            .bind(sequence_number)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to load audit entry: {}", e)))
    }

    pub async fn find_by_sequence_range(
        &self,
        start_inclusive: i64,
        end_inclusive: i64,
    ) -> Result<Vec<AuditEntry>> {
        sqlx::query_as::<_, AuditEntry>(
            "SELECT * FROM audit_log_v2 WHERE sequence_number BETWEEN ? AND ?
             ORDER BY sequence_number ASC",
        )
        .bind(start_inclusive)
        .bind(end_inclusive)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to load audit entry range: {}", e)))
    }

    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log_v2")
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to count audit entries: {}", e)))?;
        Ok(row.0)
    }

    pub async fn register_signing_key(&self, key: &SigningKey) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_signing_keys (key_id, public_key_pem, algorithm, key_size, created_at, revoked_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&key.key_id)
        .bind(&key.public_key_pem)
        .bind(&key.algorithm)
        .bind(key.key_size)
        .bind(&key.created_at)
        .bind(&key.revoked_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to register signing key: {}", e)))?;

        Ok(())
    }

    pub async fn revoke_signing_key(&self, key_id: &str, revoked_at_rfc3339: &str) -> Result<()> {
        let result = sqlx::query("UPDATE audit_signing_keys SET revoked_at = ? WHERE key_id = ?")
            .bind(revoked_at_rfc3339)
            .bind(key_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to revoke signing key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!("signing key not found: {}", key_id)));
        }
        Ok(())
    }

    pub async fn find_signing_key(&self, key_id: &str) -> Result<Option<SigningKey>> {
        sqlx::query_as::<_, SigningKey>("SELECT * FROM audit_signing_keys WHERE key_id = ?")
            .bind(key_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to load signing key: {}", e)))
    }

    pub async fn active_signing_key(&self) -> Result<Option<SigningKey>> {
        sqlx::query_as::<_, SigningKey>(
            "SELECT * FROM audit_signing_keys WHERE revoked_at IS NULL ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to load active signing key: {}", e)))
    }

    pub async fn record_root_anchor(
        &self,
        sequence_start: i64,
        sequence_end: i64,
        root_hash: &str,
        timestamp_rfc3339: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_roots (sequence_start, sequence_end, root_hash, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(sequence_start)
        .bind(sequence_end)
        .bind(root_hash)
        .bind(timestamp_rfc3339)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to record root anchor: {}", e)))?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn test_tamper_payload(&self, sequence_number: i64, new_payload_json: &str) -> Result<()> {
        sqlx::query("UPDATE audit_log_v2 SET event_payload_json = ? WHERE sequence_number = ?")
            .bind(new_payload_json)
            .bind(sequence_number)
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to tamper payload: {}", e)))?;
        Ok(())
    }

    pub async fn list_root_anchors(&self) -> Result<Vec<(i64, i64, String, String)>> {
        let rows: Vec<(i64, i64, String, String)> = sqlx::query_as(
            "SELECT sequence_start, sequence_end, root_hash, timestamp FROM audit_roots
             ORDER BY sequence_start ASC",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list root anchors: {}", e)))?;
        Ok(rows)
    }
}
