//! Correlation repository: the immutable bus-side-effect log consolidation reads.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::ServiceCorrelation;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct CorrelationRepository {
    db: Arc<Database>,
}

impl CorrelationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn save(&self, correlation: &ServiceCorrelation) -> Result<()> {
        sqlx::query(
            "INSERT INTO service_correlations (correlation_id, correlation_type, service_type,
                handler_name, action_type, request_data_json, response_data_json, timestamp, tags_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&correlation.correlation_id)
        .bind(&correlation.correlation_type)
        .bind(&correlation.service_type)
        .bind(&correlation.handler_name)
        .bind(&correlation.action_type)
        .bind(&correlation.request_data_json)
        .bind(&correlation.response_data_json)
        .bind(&correlation.timestamp)
        .bind(&correlation.tags_json)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to save correlation: {}", e)))?;

        Ok(())
    }

    pub async fn find_by_id(&self, correlation_id: &str) -> Result<Option<ServiceCorrelation>> {
        sqlx::query_as::<_, ServiceCorrelation>(
            "SELECT * FROM service_correlations WHERE correlation_id = ?",
        )
        .bind(correlation_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to load correlation: {}", e)))
    }

    pub async fn list_by_type_in_window(
        &self,
        correlation_type: &str,
        start_rfc3339: &str,
        end_rfc3339: &str,
    ) -> Result<Vec<ServiceCorrelation>> {
        sqlx::query_as::<_, ServiceCorrelation>(
            "SELECT * FROM service_correlations
             WHERE correlation_type = ? AND timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC",
        )
        .bind(correlation_type)
        .bind(start_rfc3339)
        .bind(end_rfc3339)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list correlations in window: {}", e)))
    }

    pub async fn count_in_window(&self, start_rfc3339: &str, end_rfc3339: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM service_correlations WHERE timestamp >= ? AND timestamp < ?",
        )
        .bind(start_rfc3339)
        .bind(end_rfc3339)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to count correlations: {}", e)))?;
        Ok(row.0)
    }

    pub async fn attach_response(
        &self,
        correlation_id: &str,
        response_data_json: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_correlations SET response_data_json = ? WHERE correlation_id = ?",
        )
        .bind(response_data_json)
        .bind(correlation_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to attach response: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!(
                "correlation not found: {}",
                correlation_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::CorrelationType;
    use std::sync::Arc as StdArc;

    async fn setup() -> CorrelationRepository {
        let db = Database::test_in_memory().await.unwrap();
        CorrelationRepository::new(StdArc::new(db))
    }

    #[tokio::test]
    async fn save_and_find_round_trips() {
        let repo = setup().await;
        let corr = ServiceCorrelation::new(
            CorrelationType::ServiceInteraction,
            "communication",
            "speak_handler",
            "speak",
            serde_json::json!({"channel_id": "cli_local"}),
            serde_json::json!({}),
        );
        repo.save(&corr).await.unwrap();

        let found = repo.find_by_id(&corr.correlation_id).await.unwrap().unwrap();
        assert_eq!(found.handler_name, "speak_handler");
        assert!(found.response_data_json.is_none());
    }

    #[tokio::test]
    async fn attach_response_updates_existing_row() {
        let repo = setup().await;
        let corr = ServiceCorrelation::new(
            CorrelationType::ServiceInteraction,
            "communication",
            "speak_handler",
            "speak",
            serde_json::json!({}),
            serde_json::json!({}),
        );
        repo.save(&corr).await.unwrap();
        repo.attach_response(&corr.correlation_id, r#"{"ok":true}"#)
            .await
            .unwrap();

        let found = repo.find_by_id(&corr.correlation_id).await.unwrap().unwrap();
        assert_eq!(found.response_data_json.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn window_query_excludes_entries_outside_range() {
        let repo = setup().await;
        let mut early = ServiceCorrelation::new(
            CorrelationType::TraceSpan,
            "pipeline",
            "evaluator",
            "evaluate",
            serde_json::json!({}),
            serde_json::json!({}),
        );
        early.timestamp = "2026-01-01T00:00:00+00:00".to_string();
        repo.save(&early).await.unwrap();

        let mut in_window = ServiceCorrelation::new(
            CorrelationType::TraceSpan,
            "pipeline",
            "evaluator",
            "evaluate",
            serde_json::json!({}),
            serde_json::json!({}),
        );
        in_window.timestamp = "2026-02-01T00:00:00+00:00".to_string();
        repo.save(&in_window).await.unwrap();

        let results = repo
            .list_by_type_in_window(
                "TRACE_SPAN",
                "2026-01-15T00:00:00+00:00",
                "2026-03-01T00:00:00+00:00",
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].correlation_id, in_window.correlation_id);
    }
}
