//! HandlerAction: the ten tagged actions an agent may select per thought.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The action an action-selection evaluator chooses for a thought. Exactly
/// one variant is selected per thought.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerAction {
    Speak {
        channel_id: String,
        content: String,
    },
    Observe {
        channel_id: String,
        active: bool,
    },
    Memorize {
        node_id: String,
    },
    Recall {
        query: String,
    },
    Forget {
        node_id: String,
        reason: String,
    },
    Tool {
        name: String,
        params: HashMap<String, serde_json::Value>,
    },
    Ponder {
        questions: Vec<String>,
    },
    Defer {
        reason: String,
        metadata: HashMap<String, String>,
    },
    Reject {
        reason: String,
    },
    TaskComplete,
}

impl HandlerAction {
    /// Short, stable name for this action variant, used for audit payloads
    /// and correlation `action_type` fields.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Speak { .. } => "speak",
            Self::Observe { .. } => "observe",
            Self::Memorize { .. } => "memorize",
            Self::Recall { .. } => "recall",
            Self::Forget { .. } => "forget",
            Self::Tool { .. } => "tool",
            Self::Ponder { .. } => "ponder",
            Self::Defer { .. } => "defer",
            Self::Reject { .. } => "reject",
            Self::TaskComplete => "task_complete",
        }
    }

    /// Whether dispatching this action goes through the epistemic guardrail.
    /// Only outbound speech is gated; every other action passes by default.
    pub fn requires_guardrail(&self) -> bool {
        matches!(self, Self::Speak { .. })
    }
}
