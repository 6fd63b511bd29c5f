//! Task: a durable unit of agent work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Deferred,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "deferred" => Self::Deferred,
            _ => Self::Active,
        }
    }
}

/// A unit of agent work. Root tasks have `parent_task_id == None`; shutdown
/// tasks are root tasks whose `task_id` starts with `shutdown_`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    pub channel_id: String,
    pub status: String,
    pub parent_task_id: Option<String>,
    pub retry_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Build a new root task for `channel_id`.
    pub fn new(description: impl Into<String>, channel_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self::with_parent(description, channel_id, None, now)
    }

    /// Build a new task, optionally owned by a parent task.
    pub fn with_parent(
        description: impl Into<String>,
        channel_id: impl Into<String>,
        parent_task_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            description: description.into(),
            channel_id: channel_id.into(),
            status: TaskStatus::Active.as_str().to_string(),
            parent_task_id,
            retry_count: 0,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    /// A shutdown task is a root task whose id is recognizably a shutdown request.
    pub fn is_shutdown_task(&self) -> bool {
        self.parent_task_id.is_none() && self.task_id.starts_with("shutdown_")
    }

    pub fn status_enum(&self) -> TaskStatus {
        TaskStatus::from(self.status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_active_root() {
        let task = Task::new("do the thing", "cli_local");
        assert_eq!(task.status_enum(), TaskStatus::Active);
        assert!(task.parent_task_id.is_none());
        assert!(!task.is_shutdown_task());
    }

    #[test]
    fn shutdown_prefix_is_recognized_only_for_roots() {
        let mut task = Task::new("x", "cli_local");
        task.task_id = "shutdown_abc".to_string();
        assert!(task.is_shutdown_task());

        task.parent_task_id = Some("parent".to_string());
        assert!(!task.is_shutdown_task());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TaskStatus::Active,
            TaskStatus::Paused,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Deferred,
        ] {
            assert_eq!(TaskStatus::from(s.as_str()), s);
        }
    }
}
