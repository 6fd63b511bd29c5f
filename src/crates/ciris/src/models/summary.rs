//! Summary nodes produced by the consolidation pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationLevel {
    Basic,
    Extensive,
    Profound,
}

impl ConsolidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Extensive => "extensive",
            Self::Profound => "profound",
        }
    }
}

/// The five summary node kinds the basic consolidation pass emits, one per
/// correlation/domain type, per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Tsdb,
    Conversation,
    Trace,
    Task,
    Audit,
}

impl SummaryKind {
    pub fn all() -> [SummaryKind; 5] {
        [
            SummaryKind::Tsdb,
            SummaryKind::Conversation,
            SummaryKind::Trace,
            SummaryKind::Task,
            SummaryKind::Audit,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tsdb => "tsdb",
            Self::Conversation => "conversation",
            Self::Trace => "trace",
            Self::Task => "task",
            Self::Audit => "audit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricAggregate {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsdbSummary {
    pub period_start: String,
    pub period_end: String,
    pub period_label: String,
    pub consolidation_level: String,
    pub source_correlation_count: u64,
    pub metrics: HashMap<String, MetricAggregate>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_carbon: f64,
    pub total_energy: f64,
    pub action_counts: HashMap<String, u64>,
    pub error_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub timestamp: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub execution_time_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub period_start: String,
    pub period_end: String,
    pub period_label: String,
    pub consolidation_level: String,
    pub source_correlation_count: u64,
    pub conversations_by_channel: HashMap<String, Vec<ConversationMessage>>,
    pub total_messages: u64,
    pub unique_users: u64,
    pub action_counts: HashMap<String, u64>,
    pub service_call_counts: HashMap<String, u64>,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub period_start: String,
    pub period_end: String,
    pub period_label: String,
    pub consolidation_level: String,
    pub source_correlation_count: u64,
    pub unique_task_count: u64,
    pub unique_thought_count: u64,
    pub component_call_counts: HashMap<String, u64>,
    pub component_failure_counts: HashMap<String, u64>,
    pub component_latency: HashMap<String, LatencyPercentiles>,
    pub handler_action_counts: HashMap<String, u64>,
    pub guardrail_violations: HashMap<String, u64>,
    pub dma_decision_counts: HashMap<String, u64>,
    pub total_tasks_processed: u64,
}

/// One task's slice of a [`TaskSummary`] window, including which handlers
/// served its thoughts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerTaskSummary {
    pub task_id: String,
    pub status: String,
    pub channel_id: String,
    pub retry_count: i64,
    pub duration_ms: f64,
    pub handlers_selected: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub period_start: String,
    pub period_end: String,
    pub period_label: String,
    pub consolidation_level: String,
    pub source_correlation_count: u64,
    pub task_count_by_status: HashMap<String, u64>,
    pub task_count_by_channel: HashMap<String, u64>,
    pub completion_rate: f64,
    pub handler_usage: HashMap<String, u64>,
    pub duration: LatencyPercentiles,
    pub retry_total: u64,
    pub task_summaries: Vec<PerTaskSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub period_start: String,
    pub period_end: String,
    pub period_label: String,
    pub consolidation_level: String,
    pub source_correlation_count: u64,
    pub total_audit_events: u64,
    pub auth_success_count: u64,
    pub auth_failure_count: u64,
    pub permission_denial_count: u64,
    pub config_change_count: u64,
    pub audit_hash: String,
    pub hash_algorithm: String,
}

/// Deterministic id for a basic-level summary in a given window.
pub fn basic_summary_id(kind: SummaryKind, period_start_label: &str) -> String {
    format!("{}_basic_{}", kind.as_str(), period_start_label)
}

/// Deterministic id for a daily (extensive) summary: `{type}_daily_{YYYYMMDD}`.
pub fn daily_summary_id(kind: SummaryKind, yyyymmdd: &str) -> String {
    format!("{}_daily_{}", kind.as_str(), yyyymmdd)
}
