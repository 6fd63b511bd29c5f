//! Task repository: persistence for the task half of the pipeline.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::Task;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct TaskRepository {
    db: Arc<Database>,
}

impl TaskRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn save(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (task_id, description, channel_id, status, parent_task_id, retry_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.task_id)
        .bind(&task.description)
        .bind(&task.channel_id)
        .bind(&task.status)
        .bind(&task.parent_task_id)
        .bind(task.retry_count)
        .bind(&task.created_at)
        .bind(&task.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to save task: {}", e)))?;

        Ok(())
    }

    pub async fn find_by_id(&self, task_id: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to load task: {}", e)))?;

        Ok(task)
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at DESC")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to list tasks: {}", e)))
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Task>> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE status = ? ORDER BY created_at DESC")
            .bind(status)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to list tasks by status: {}", e)))
    }

    /// Non-root tasks that are ACTIVE but whose parent is missing or not
    /// ACTIVE/COMPLETED - the orphan set maintenance removes at startup.
    pub async fn find_orphaned_active(&self) -> Result<Vec<Task>> {
        let active = self.list_by_status("active").await?;
        let mut orphans = Vec::new();
        for task in active {
            if task.is_shutdown_task() {
                continue;
            }
            match &task.parent_task_id {
                None => continue,
                Some(parent_id) => {
                    let parent = self.find_by_id(parent_id).await?;
                    let parent_ok = parent
                        .map(|p| matches!(p.status.as_str(), "active" | "completed"))
                        .unwrap_or(false);
                    if !parent_ok {
                        orphans.push(task);
                    }
                }
            }
        }
        Ok(orphans)
    }

    /// Active root tasks whose id starts with one of the six wakeup-step
    /// prefixes - leftovers from an interrupted WAKEUP.
    pub async fn find_stale_wakeup_tasks(&self) -> Result<Vec<Task>> {
        const PREFIXES: [&str; 6] = [
            "WAKEUP_",
            "VERIFY_IDENTITY_",
            "VALIDATE_INTEGRITY_",
            "EVALUATE_RESILIENCE_",
            "ACCEPT_INCOMPLETENESS_",
            "EXPRESS_GRATITUDE_",
        ];
        let active = self.list_by_status("active").await?;
        Ok(active
            .into_iter()
            .filter(|t| PREFIXES.iter().any(|p| t.task_id.starts_with(p)))
            .collect())
    }

    pub async fn update_status(&self, task_id: &str, status: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE task_id = ?")
            .bind(status)
            .bind(&updated_at)
            .bind(task_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to update task status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!("task not found: {}", task_id)));
        }
        Ok(())
    }

    pub async fn delete_many(&self, task_ids: &[String]) -> Result<u64> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = task_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM tasks WHERE task_id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in task_ids {
            query = query.bind(id);
        }
        let result = query
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to delete tasks: {}", e)))?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self, status: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to count tasks: {}", e)))?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, TaskRepository) {
        let db = Database::test_in_memory().await.unwrap();
        let repo = TaskRepository::new(Arc::new(db.clone()));
        (db, repo)
    }

    #[tokio::test]
    async fn save_and_find_round_trips() {
        let (_db, repo) = setup().await;
        let task = Task::new("do a thing", "cli_local");
        repo.save(&task).await.unwrap();

        let found = repo.find_by_id(&task.task_id).await.unwrap().unwrap();
        assert_eq!(found.description, "do a thing");
        assert_eq!(found.status, "active");
    }

    #[tokio::test]
    async fn find_by_id_returns_none_when_missing() {
        let (_db, repo) = setup().await;
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn orphan_detection_flags_tasks_with_missing_or_dead_parent() {
        let (_db, repo) = setup().await;

        let root = Task::new("root", "cli_local");
        repo.save(&root).await.unwrap();

        let mut orphan = Task::new("orphan", "cli_local");
        orphan.parent_task_id = Some("does-not-exist".to_string());
        repo.save(&orphan).await.unwrap();

        let mut child_of_failed = Task::new("child", "cli_local");
        let mut failed_parent = Task::new("failed-parent", "cli_local");
        failed_parent.status = "failed".to_string();
        repo.save(&failed_parent).await.unwrap();
        child_of_failed.parent_task_id = Some(failed_parent.task_id.clone());
        repo.save(&child_of_failed).await.unwrap();

        let mut healthy_child = Task::new("healthy-child", "cli_local");
        healthy_child.parent_task_id = Some(root.task_id.clone());
        repo.save(&healthy_child).await.unwrap();

        let orphans = repo.find_orphaned_active().await.unwrap();
        let orphan_ids: Vec<_> = orphans.iter().map(|t| t.task_id.clone()).collect();
        assert!(orphan_ids.contains(&orphan.task_id));
        assert!(orphan_ids.contains(&child_of_failed.task_id));
        assert!(!orphan_ids.contains(&healthy_child.task_id));
        assert!(!orphan_ids.contains(&root.task_id));
    }

    #[tokio::test]
    async fn shutdown_tasks_are_exempt_from_orphan_detection() {
        let (_db, repo) = setup().await;
        let mut shutdown_task = Task::new("shutdown", "cli_local");
        shutdown_task.task_id = "shutdown_abc".to_string();
        repo.save(&shutdown_task).await.unwrap();

        let orphans = repo.find_orphaned_active().await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn stale_wakeup_tasks_are_found_by_prefix() {
        let (_db, repo) = setup().await;
        let mut wakeup = Task::new("wakeup step", "cli_local");
        wakeup.task_id = "WAKEUP_1".to_string();
        repo.save(&wakeup).await.unwrap();

        let mut unrelated = Task::new("normal", "cli_local");
        repo.save(&unrelated).await.unwrap();

        let stale = repo.find_stale_wakeup_tasks().await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].task_id, "WAKEUP_1");
    }

    #[tokio::test]
    async fn count_by_status_reflects_saved_rows() {
        let (_db, repo) = setup().await;
        repo.save(&Task::new("a", "cli_local")).await.unwrap();
        repo.save(&Task::new("b", "cli_local")).await.unwrap();
        assert_eq!(repo.count_by_status("active").await.unwrap(), 2);
        assert_eq!(repo.count_by_status("completed").await.unwrap(), 0);
    }
}
