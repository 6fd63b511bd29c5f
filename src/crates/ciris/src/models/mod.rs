//! Typed domain models for the CIRIS agent core.

mod audit;
mod correlation;
mod deferral;
mod graph;
mod handler_action;
mod summary;
mod task;
mod thought;

pub use audit::{AuditEntry, SigningKey};
pub use correlation::{CorrelationType, ServiceCorrelation};
pub use deferral::DeferralTicket;
pub use graph::{GraphEdge, GraphNode, NodeScope, NodeType};
pub use handler_action::HandlerAction;
pub use summary::{
    basic_summary_id, daily_summary_id, AuditSummary, ConsolidationLevel, ConversationMessage,
    ConversationSummary, LatencyPercentiles, MetricAggregate, PerTaskSummary, SummaryKind,
    TaskSummary, TraceSummary, TsdbSummary,
};
pub use task::{Task, TaskStatus};
pub use thought::{Thought, ThoughtStatus};
