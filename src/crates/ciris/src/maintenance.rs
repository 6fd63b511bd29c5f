//! Startup cleanup and scheduled maintenance over the task/thought/graph
//! stores: stale-data removal on boot, consolidation and archival while
//! running, and a best-effort final pass on shutdown.

use crate::error::Result;
use crate::memory::Consolidator;
use crate::models::NodeType;
use crate::repositories::{GraphRepository, TaskRepository, ThoughtRepository};
use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Config key prefixes written for a single run and meaningless across
/// restarts; anything under these is removed at startup unless it was
/// written by bootstrap.
const RUNTIME_CONFIG_PREFIXES: [&str; 4] = ["adapter.", "runtime.", "session.", "temp."];
const BOOTSTRAP_WRITER: &str = "system_bootstrap";

#[derive(Debug, Clone, Default)]
pub struct StartupCleanupReport {
    pub invalid_thoughts_deleted: u64,
    pub runtime_config_deleted: u64,
    pub stale_wakeup_tasks_deleted: u64,
    pub stale_wakeup_thoughts_deleted: u64,
    pub orphaned_tasks_deleted: u64,
    pub orphaned_thoughts_deleted: u64,
    pub archived_thoughts: u64,
}

pub struct MaintenanceService {
    tasks: TaskRepository,
    thoughts: ThoughtRepository,
    graph: GraphRepository,
    consolidator: Consolidator,
    archive_dir: PathBuf,
    archive_older_than_hours: i64,
}

impl MaintenanceService {
    pub fn new(
        tasks: TaskRepository,
        thoughts: ThoughtRepository,
        graph: GraphRepository,
        consolidator: Consolidator,
        archive_dir: impl Into<PathBuf>,
        archive_older_than_hours: i64,
    ) -> Self {
        Self {
            tasks,
            thoughts,
            graph,
            consolidator,
            archive_dir: archive_dir.into(),
            archive_older_than_hours,
        }
    }

    /// Runs the full ordered startup sweep. Safe to call more than once: a
    /// clean store produces an all-zero report.
    pub async fn perform_startup_cleanup(&self) -> Result<StartupCleanupReport> {
        info!("starting database cleanup");
        tokio::fs::create_dir_all(&self.archive_dir).await?;

        let mut report = StartupCleanupReport::default();

        report.invalid_thoughts_deleted = self.cleanup_invalid_thoughts().await?;
        report.runtime_config_deleted = self.cleanup_runtime_config().await?;
        let (stale_tasks, stale_thoughts) = self.cleanup_stale_wakeup_tasks().await?;
        report.stale_wakeup_tasks_deleted = stale_tasks;
        report.stale_wakeup_thoughts_deleted = stale_thoughts;
        let (orphan_tasks, orphan_thoughts) = self.cleanup_orphans().await?;
        report.orphaned_tasks_deleted = orphan_tasks;
        report.orphaned_thoughts_deleted = orphan_thoughts;
        report.archived_thoughts = self.archive_old_thoughts().await?;

        info!(?report, "database cleanup completed");
        Ok(report)
    }

    async fn cleanup_invalid_thoughts(&self) -> Result<u64> {
        let invalid = self.thoughts.find_with_invalid_context().await?;
        if invalid.is_empty() {
            info!("no thoughts with invalid context found");
            return Ok(0);
        }
        let ids: Vec<String> = invalid.into_iter().map(|t| t.thought_id).collect();
        let deleted = self.thoughts.delete_many(&ids).await?;
        info!(deleted, "removed thoughts with invalid context");
        Ok(deleted)
    }

    /// Runtime-scoped config nodes are recreated every boot; keep only the
    /// ones bootstrap itself wrote.
    async fn cleanup_runtime_config(&self) -> Result<u64> {
        let nodes = self.graph.list_nodes_by_type(NodeType::Config.as_str()).await?;
        let mut deleted = 0u64;
        for node in nodes {
            let is_runtime = RUNTIME_CONFIG_PREFIXES.iter().any(|p| node.id.starts_with(p));
            if !is_runtime {
                continue;
            }
            if node.updated_by == BOOTSTRAP_WRITER {
                continue;
            }
            self.graph.delete_node(&node.id).await?;
            deleted += 1;
        }
        if deleted > 0 {
            info!(deleted, "removed runtime-specific config entries from previous run");
        } else {
            info!("no runtime-specific config entries to clean up");
        }
        Ok(deleted)
    }

    /// Active wakeup-step tasks (and their pending/processing thoughts) left
    /// over from a run that never reached shutdown.
    async fn cleanup_stale_wakeup_tasks(&self) -> Result<(u64, u64)> {
        let stale_tasks = self.tasks.find_stale_wakeup_tasks().await?;
        if stale_tasks.is_empty() {
            info!("no stale wakeup tasks or thoughts found");
            return Ok((0, 0));
        }

        let mut thought_ids = Vec::new();
        for task in &stale_tasks {
            let thoughts = self.thoughts.list_by_task(&task.task_id).await?;
            for thought in thoughts {
                if matches!(thought.status.as_str(), "pending" | "processing") {
                    thought_ids.push(thought.thought_id);
                }
            }
        }

        let deleted_thoughts = self.thoughts.delete_many(&thought_ids).await?;
        let task_ids: Vec<String> = stale_tasks.into_iter().map(|t| t.task_id).collect();
        let deleted_tasks = self.tasks.delete_many(&task_ids).await?;
        info!(deleted_tasks, deleted_thoughts, "removed stale wakeup state from interrupted startup");
        Ok((deleted_tasks, deleted_thoughts))
    }

    async fn cleanup_orphans(&self) -> Result<(u64, u64)> {
        let orphan_tasks = self.tasks.find_orphaned_active().await?;
        let deleted_tasks = if orphan_tasks.is_empty() {
            0
        } else {
            let ids: Vec<String> = orphan_tasks.into_iter().map(|t| t.task_id).collect();
            self.tasks.delete_many(&ids).await?
        };

        let orphan_thoughts = self.thoughts.find_orphaned().await?;
        let deleted_thoughts = if orphan_thoughts.is_empty() {
            0
        } else {
            let ids: Vec<String> = orphan_thoughts.into_iter().map(|t| t.thought_id).collect();
            self.thoughts.delete_many(&ids).await?
        };

        info!(deleted_tasks, deleted_thoughts, "orphan cleanup complete");
        Ok((deleted_tasks, deleted_thoughts))
    }

    /// Tasks are summarized by the consolidator, not archived here; only
    /// thoughts older than the configured threshold are written to disk.
    async fn archive_old_thoughts(&self) -> Result<u64> {
        let now = Utc::now();
        let cutoff = (now - chrono::Duration::hours(self.archive_older_than_hours)).to_rfc3339();
        let aged = self.thoughts.list_older_than(&cutoff).await?;
        if aged.is_empty() {
            info!(hours = self.archive_older_than_hours, "no thoughts old enough to archive");
            return Ok(0);
        }

        let file_name = format!("archive_thoughts_{}.jsonl", now.format("%Y%m%d_%H%M%S"));
        let path = self.archive_dir.join(file_name);
        let mut file = tokio::fs::File::create(&path).await?;

        let mut ids = Vec::with_capacity(aged.len());
        for thought in &aged {
            let line = serde_json::to_string(thought)?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            ids.push(thought.thought_id.clone());
        }
        file.flush().await?;

        let deleted = self.thoughts.delete_many(&ids).await?;
        info!(deleted, path = %path.display(), "archived and removed aged thoughts");
        Ok(deleted)
    }

    /// Runs the periodic (hourly) maintenance pass: basic consolidation over
    /// the current 6-hour window (a no-op once the window is summarized) and
    /// the daily roll-up for yesterday. Failures are logged, not propagated -
    /// a missed hourly pass should not take the scheduler down.
    pub async fn run_scheduled_maintenance(&self) {
        let now = Utc::now();
        let (window_start, window_end, label) = crate::memory::six_hour_window(now);
        match self.consolidator.consolidate_basic(&window_start, &window_end, &label).await {
            Ok(created) => info!(created = created.len(), "periodic maintenance consolidation complete"),
            Err(e) => warn!(error = %e, "periodic maintenance consolidation failed"),
        }

        let yesterday = (now - chrono::Duration::days(1)).date_naive();
        match self.consolidator.consolidate_daily(yesterday).await {
            Ok(created) if !created.is_empty() => {
                info!(created = created.len(), "daily roll-up complete")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "daily roll-up failed"),
        }
    }

    /// Best-effort cleanup run once on shutdown; swallows errors since the
    /// process is already on its way out.
    pub async fn final_cleanup(&self) {
        if let Err(e) = self.archive_old_thoughts().await {
            warn!(error = %e, "final archive pass failed during shutdown");
        }
        info!("final maintenance cleanup executed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{GraphNode, NodeScope, Task, Thought};
    use crate::repositories::CorrelationRepository;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn setup() -> (MaintenanceService, TaskRepository, ThoughtRepository, GraphRepository, tempfile::TempDir) {
        let db = Arc::new(Database::test_in_memory().await.unwrap());
        let tasks = TaskRepository::new(db.clone());
        let thoughts = ThoughtRepository::new(db.clone());
        let graph = GraphRepository::new(db.clone());
        let correlations = CorrelationRepository::new(db.clone());
        let consolidator = Consolidator::new(correlations, tasks.clone(), graph.clone());
        let dir = tempdir().unwrap();
        let service = MaintenanceService::new(
            tasks.clone(),
            thoughts.clone(),
            graph.clone(),
            consolidator,
            dir.path().join("data_archive"),
            24,
        );
        (service, tasks, thoughts, graph, dir)
    }

    #[tokio::test]
    async fn clean_store_produces_an_all_zero_report() {
        let (service, _tasks, _thoughts, _graph, _dir) = setup().await;
        let report = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(report.invalid_thoughts_deleted, 0);
        assert_eq!(report.orphaned_tasks_deleted, 0);
    }

    #[tokio::test]
    async fn startup_cleanup_is_idempotent() {
        let (service, tasks, thoughts, _graph, _dir) = setup().await;

        let mut orphan = Task::new("orphan", "cli_local");
        orphan.parent_task_id = Some("missing-parent".to_string());
        tasks.save(&orphan).await.unwrap();

        let mut bad_thought = Thought::new("missing-task", "garbage", "c1");
        bad_thought.context_json = "{}".to_string();
        thoughts.save(&bad_thought).await.unwrap();

        let first = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(first.orphaned_tasks_deleted, 1);
        assert_eq!(first.invalid_thoughts_deleted, 1);

        let second = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(second.orphaned_tasks_deleted, 0);
        assert_eq!(second.invalid_thoughts_deleted, 0);
    }

    #[tokio::test]
    async fn stale_wakeup_tasks_and_thoughts_are_removed() {
        let (service, tasks, thoughts, _graph, _dir) = setup().await;

        let mut wakeup_task = Task::new("wakeup affirmation", "system");
        wakeup_task.task_id = "WAKEUP_abc".to_string();
        tasks.save(&wakeup_task).await.unwrap();

        let pending = Thought::new(&wakeup_task.task_id, "affirm", "c1");
        thoughts.save(&pending).await.unwrap();

        let report = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(report.stale_wakeup_tasks_deleted, 1);
        assert_eq!(report.stale_wakeup_thoughts_deleted, 1);
    }

    #[tokio::test]
    async fn bootstrap_config_is_preserved_other_runtime_config_is_not() {
        let (service, _tasks, _thoughts, graph, _dir) = setup().await;

        let bootstrap_node = GraphNode::new(
            "runtime.core_setting",
            NodeType::Config,
            NodeScope::Local,
            serde_json::json!({"value": 1}),
            "system_bootstrap",
        );
        graph.upsert_node(&bootstrap_node).await.unwrap();

        let session_node = GraphNode::new(
            "session.last_channel",
            NodeType::Config,
            NodeScope::Local,
            serde_json::json!({"value": "c1"}),
            "adapter",
        );
        graph.upsert_node(&session_node).await.unwrap();

        let report = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(report.runtime_config_deleted, 1);
        assert!(graph.find_node("runtime.core_setting").await.unwrap().is_some());
        assert!(graph.find_node("session.last_channel").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn aged_thoughts_are_archived_to_jsonl_and_removed() {
        let (service, _tasks, thoughts, _graph, dir) = setup().await;

        let mut old_thought = Thought::new("task-1", "old content", "c1");
        old_thought.created_at = (Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        thoughts.save(&old_thought).await.unwrap();

        let report = service.perform_startup_cleanup().await.unwrap();
        assert_eq!(report.archived_thoughts, 1);
        assert!(thoughts.find_by_id(&old_thought.thought_id).await.unwrap().is_none());

        let mut entries = tokio::fs::read_dir(dir.path().join("data_archive")).await.unwrap();
        let first = entries.next_entry().await.unwrap();
        assert!(first.is_some());
    }
}
