//! Thought repository: persistence for reasoning steps.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::Thought;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ThoughtRepository {
    db: Arc<Database>,
}

impl ThoughtRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn save(&self, thought: &Thought) -> Result<()> {
        sqlx::query(
            "INSERT INTO thoughts (thought_id, source_task_id, status, content, ponder_count,
                round_processed, final_action_json, context_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thought.thought_id)
        .bind(&thought.source_task_id)
        .bind(&thought.status)
        .bind(&thought.content)
        .bind(thought.ponder_count)
        .bind(thought.round_processed)
        .bind(&thought.final_action_json)
        .bind(&thought.context_json)
        .bind(&thought.created_at)
        .bind(&thought.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to save thought: {}", e)))?;

        Ok(())
    }

    pub async fn find_by_id(&self, thought_id: &str) -> Result<Option<Thought>> {
        sqlx::query_as::<_, Thought>("SELECT * FROM thoughts WHERE thought_id = ?")
            .bind(thought_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to load thought: {}", e)))
    }

    pub async fn list_by_task(&self, task_id: &str) -> Result<Vec<Thought>> {
        sqlx::query_as::<_, Thought>(
            "SELECT * FROM thoughts WHERE source_task_id = ? ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list thoughts by task: {}", e)))
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Thought>> {
        sqlx::query_as::<_, Thought>(
            "SELECT * FROM thoughts WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list thoughts by status: {}", e)))
    }

    /// Thoughts whose `context_json` is NULL, empty, `{}`, or missing either
    /// required key - the set maintenance purges at startup.
    pub async fn find_with_invalid_context(&self) -> Result<Vec<Thought>> {
        let candidates = sqlx::query_as::<_, Thought>(
            "SELECT * FROM thoughts WHERE context_json IS NULL
                OR context_json = ''
                OR context_json = '{}'
                OR context_json NOT LIKE '%task_id%'
                OR context_json NOT LIKE '%correlation_id%'",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to scan thought contexts: {}", e)))?;

        // The LIKE predicates above are a cheap pre-filter; confirm with the
        // real parser so well-formed contexts that merely substring-match
        // aren't misclassified as invalid, and vice versa.
        Ok(candidates
            .into_iter()
            .filter(|t| !t.has_valid_context())
            .collect())
    }

    pub async fn find_orphaned(&self) -> Result<Vec<Thought>> {
        sqlx::query_as::<_, Thought>(
            "SELECT t.* FROM thoughts t
             LEFT JOIN tasks k ON t.source_task_id = k.task_id
             WHERE k.task_id IS NULL AND t.status IN ('pending', 'processing')",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to find orphaned thoughts: {}", e)))
    }

    pub async fn list_older_than(&self, cutoff_rfc3339: &str) -> Result<Vec<Thought>> {
        sqlx::query_as::<_, Thought>(
            "SELECT * FROM thoughts WHERE created_at < ? ORDER BY created_at ASC",
        )
        .bind(cutoff_rfc3339)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list aged thoughts: {}", e)))
    }

    pub async fn update(&self, thought: &Thought) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE thoughts SET status = ?, ponder_count = ?, round_processed = ?,
                final_action_json = ?, updated_at = ? WHERE thought_id = ?",
        )
        .bind(&thought.status)
        .bind(thought.ponder_count)
        .bind(thought.round_processed)
        .bind(&thought.final_action_json)
        .bind(&updated_at)
        .bind(&thought.thought_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to update thought: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!(
                "thought not found: {}",
                thought.thought_id
            )));
        }
        Ok(())
    }

    pub async fn delete_many(&self, thought_ids: &[String]) -> Result<u64> {
        if thought_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = thought_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM thoughts WHERE thought_id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in thought_ids {
            query = query.bind(id);
        }
        let result = query
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to delete thoughts: {}", e)))?;
        Ok(result.rows_affected())
    }
}
