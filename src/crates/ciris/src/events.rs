//! Runtime event log for observability: task/thought lifecycle, pipeline
//! dispatch outcomes, and cognitive-scheduler state transitions.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Event types emitted while the agent runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A task was accepted into the pipeline.
    TaskCreated {
        task_id: String,
        description: String,
        timestamp: i64,
    },
    /// A task reached a terminal status.
    TaskCompleted {
        task_id: String,
        timestamp: i64,
    },
    TaskFailed {
        task_id: String,
        reason: String,
        timestamp: i64,
    },
    /// A thought entered the processing queue.
    ThoughtCreated {
        thought_id: String,
        source_task_id: String,
        timestamp: i64,
    },
    /// A thought's evaluator chain selected and dispatched an action.
    ThoughtProcessed {
        thought_id: String,
        action: String,
        round_number: i64,
        timestamp: i64,
    },
    /// The epistemic guardrail blocked a SPEAK action.
    GuardrailBreach {
        thought_id: String,
        entropy: f64,
        coherence: f64,
        timestamp: i64,
    },
    /// The scheduler started a round in a given cognitive state.
    RoundStarted {
        round_number: i64,
        state: String,
        timestamp: i64,
    },
    /// The cognitive state machine transitioned.
    StateTransition {
        from: String,
        to: String,
        timestamp: i64,
    },
    /// A verified emergency-shutdown command was accepted.
    EmergencyShutdown {
        reason: String,
        force: bool,
        timestamp: i64,
    },
}

impl RuntimeEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            RuntimeEvent::TaskCreated { timestamp, .. }
            | RuntimeEvent::TaskCompleted { timestamp, .. }
            | RuntimeEvent::TaskFailed { timestamp, .. }
            | RuntimeEvent::ThoughtCreated { timestamp, .. }
            | RuntimeEvent::ThoughtProcessed { timestamp, .. }
            | RuntimeEvent::GuardrailBreach { timestamp, .. }
            | RuntimeEvent::RoundStarted { timestamp, .. }
            | RuntimeEvent::StateTransition { timestamp, .. }
            | RuntimeEvent::EmergencyShutdown { timestamp, .. } => *timestamp,
        }
    }

    pub fn description(&self) -> String {
        match self {
            RuntimeEvent::TaskCreated { task_id, description, .. } => {
                format!("task created: {} ({})", task_id, description)
            }
            RuntimeEvent::TaskCompleted { task_id, .. } => format!("task completed: {}", task_id),
            RuntimeEvent::TaskFailed { task_id, reason, .. } => {
                format!("task failed: {} - {}", task_id, reason)
            }
            RuntimeEvent::ThoughtCreated { thought_id, source_task_id, .. } => {
                format!("thought created: {} (task {})", thought_id, source_task_id)
            }
            RuntimeEvent::ThoughtProcessed { thought_id, action, round_number, .. } => {
                format!("thought {} dispatched {} in round {}", thought_id, action, round_number)
            }
            RuntimeEvent::GuardrailBreach { thought_id, entropy, coherence, .. } => {
                format!(
                    "guardrail breach on thought {}: entropy={:.3} coherence={:.3}",
                    thought_id, entropy, coherence
                )
            }
            RuntimeEvent::RoundStarted { round_number, state, .. } => {
                format!("round {} started in {}", round_number, state)
            }
            RuntimeEvent::StateTransition { from, to, .. } => format!("state transition: {} -> {}", from, to),
            RuntimeEvent::EmergencyShutdown { reason, force, .. } => {
                format!("emergency shutdown accepted: {} (force={})", reason, force)
            }
        }
    }

    pub fn task_created(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::TaskCreated {
            task_id: task_id.into(),
            description: description.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn task_completed(task_id: impl Into<String>) -> Self {
        Self::TaskCompleted {
            task_id: task_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn task_failed(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            reason: reason.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn thought_created(thought_id: impl Into<String>, source_task_id: impl Into<String>) -> Self {
        Self::ThoughtCreated {
            thought_id: thought_id.into(),
            source_task_id: source_task_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn thought_processed(thought_id: impl Into<String>, action: impl Into<String>, round_number: i64) -> Self {
        Self::ThoughtProcessed {
            thought_id: thought_id.into(),
            action: action.into(),
            round_number,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn guardrail_breach(thought_id: impl Into<String>, entropy: f64, coherence: f64) -> Self {
        Self::GuardrailBreach {
            thought_id: thought_id.into(),
            entropy,
            coherence,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn round_started(round_number: i64, state: impl Into<String>) -> Self {
        Self::RoundStarted {
            round_number,
            state: state.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn state_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::StateTransition {
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn emergency_shutdown(reason: impl Into<String>, force: bool) -> Self {
        Self::EmergencyShutdown {
            reason: reason.into(),
            force,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Thin wrapper routing events through `tracing`; disabled loggers are a
/// no-op rather than a branch at every call site.
#[derive(Debug, Clone)]
pub struct EventLogger {
    enabled: bool,
}

impl EventLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn log(&self, event: &RuntimeEvent) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            event = ?event,
            timestamp = event.timestamp(),
            description = %event.description(),
            "runtime event"
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
