//! Deferral repository: persisted wise-authority escalation tickets.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::DeferralTicket;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct DeferralRepository {
    db: Arc<Database>,
}

impl DeferralRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn save(&self, ticket: &DeferralTicket) -> Result<()> {
        sqlx::query(
            "INSERT INTO deferral_tickets (deferral_id, thought_id, reason, metadata_json, created_at, resolved_at, resolution)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ticket.deferral_id)
        .bind(&ticket.thought_id)
        .bind(&ticket.reason)
        .bind(&ticket.metadata_json)
        .bind(&ticket.created_at)
        .bind(&ticket.resolved_at)
        .bind(&ticket.resolution)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to save deferral ticket: {}", e)))?;

        Ok(())
    }

    pub async fn find_by_id(&self, deferral_id: &str) -> Result<Option<DeferralTicket>> {
        sqlx::query_as::<_, DeferralTicket>(
            "SELECT * FROM deferral_tickets WHERE deferral_id = ?",
        )
        .bind(deferral_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to load deferral ticket: {}", e)))
    }

    pub async fn list_open(&self) -> Result<Vec<DeferralTicket>> {
        sqlx::query_as::<_, DeferralTicket>(
            "SELECT * FROM deferral_tickets WHERE resolved_at IS NULL ORDER BY created_at ASC",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list open deferrals: {}", e)))
    }

    pub async fn resolve(&self, deferral_id: &str, resolution: &str) -> Result<()> {
        let resolved_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE deferral_tickets SET resolved_at = ?, resolution = ? WHERE deferral_id = ?",
        )
        .bind(&resolved_at)
        .bind(resolution)
        .bind(deferral_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to resolve deferral: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!("deferral not found: {}", deferral_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::Arc as StdArc;

    async fn setup() -> DeferralRepository {
        let db = Database::test_in_memory().await.unwrap();
        DeferralRepository::new(StdArc::new(db))
    }

    #[tokio::test]
    async fn save_and_find_round_trips() {
        let repo = setup().await;
        let ticket = DeferralTicket::new("thought-1", "ambiguous request", serde_json::json!({"k": "v"}));
        repo.save(&ticket).await.unwrap();

        let found = repo.find_by_id(&ticket.deferral_id).await.unwrap().unwrap();
        assert_eq!(found.thought_id, "thought-1");
        assert!(found.is_open());
    }

    #[tokio::test]
    async fn resolving_closes_the_ticket() {
        let repo = setup().await;
        let ticket = DeferralTicket::new("thought-1", "escalate", serde_json::json!({}));
        repo.save(&ticket).await.unwrap();

        assert_eq!(repo.list_open().await.unwrap().len(), 1);
        repo.resolve(&ticket.deferral_id, "approved by operator").await.unwrap();
        assert!(repo.list_open().await.unwrap().is_empty());

        let reloaded = repo.find_by_id(&ticket.deferral_id).await.unwrap().unwrap();
        assert!(!reloaded.is_open());
        assert_eq!(reloaded.resolution.as_deref(), Some("approved by operator"));
    }

    #[tokio::test]
    async fn resolving_a_missing_ticket_errors() {
        let repo = setup().await;
        assert!(repo.resolve("nope", "x").await.is_err());
    }
}
