//! Thought: a single reasoning step owned by a task.

use super::handler_action::HandlerAction;
use crate::error::{CirisError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtStatus {
    Pending,
    Processing,
    Completed,
    Deferred,
    Failed,
}

impl ThoughtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Deferred => "deferred",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ThoughtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ThoughtStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "deferred" => Self::Deferred,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A reasoning step owned by a [`crate::models::Task`].
///
/// `context` must contain `task_id` and `correlation_id`; thoughts whose
/// stored context is missing either key are purged by maintenance at startup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Thought {
    pub thought_id: String,
    pub source_task_id: String,
    pub status: String,
    pub content: String,
    pub ponder_count: i64,
    pub round_processed: Option<i64>,
    pub final_action_json: Option<String>,
    pub context_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Thought {
    pub fn new(
        source_task_id: impl Into<String>,
        content: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let source_task_id = source_task_id.into();
        let context = serde_json::json!({
            "task_id": source_task_id,
            "correlation_id": correlation_id.into(),
        });
        let now = Utc::now().to_rfc3339();
        Self {
            thought_id: Uuid::new_v4().to_string(),
            source_task_id,
            status: ThoughtStatus::Pending.as_str().to_string(),
            content: content.into(),
            ponder_count: 0,
            round_processed: None,
            final_action_json: None,
            context_json: context.to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status_enum(&self) -> ThoughtStatus {
        ThoughtStatus::from(self.status.as_str())
    }

    pub fn final_action(&self) -> Result<Option<HandlerAction>> {
        match &self.final_action_json {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        }
    }

    pub fn set_final_action(&mut self, action: &HandlerAction) -> Result<()> {
        self.final_action_json = Some(serde_json::to_string(action)?);
        Ok(())
    }

    /// A thought's context is valid iff it deserializes and contains both
    /// `task_id` and `correlation_id` keys. Maintenance uses this to decide
    /// what to purge at startup.
    pub fn has_valid_context(&self) -> bool {
        match serde_json::from_str::<serde_json::Value>(&self.context_json) {
            Ok(serde_json::Value::Object(map)) => {
                map.contains_key("task_id") && map.contains_key("correlation_id")
            }
            _ => false,
        }
    }

    pub fn correlation_id(&self) -> Result<String> {
        let value: serde_json::Value = serde_json::from_str(&self.context_json)?;
        value
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| CirisError::Other("thought context missing correlation_id".into()))
    }
}
