//! Graph memory: typed nodes and deterministic-id edges.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Observation,
    Concept,
    User,
    Channel,
    AuditEntry,
    TsdbSummary,
    ConversationSummary,
    TraceSummary,
    TaskSummary,
    AuditSummary,
    Identity,
    Config,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "OBSERVATION",
            Self::Concept => "CONCEPT",
            Self::User => "USER",
            Self::Channel => "CHANNEL",
            Self::AuditEntry => "AUDIT_ENTRY",
            Self::TsdbSummary => "TSDB_SUMMARY",
            Self::ConversationSummary => "CONVERSATION_SUMMARY",
            Self::TraceSummary => "TRACE_SUMMARY",
            Self::TaskSummary => "TASK_SUMMARY",
            Self::AuditSummary => "AUDIT_SUMMARY",
            Self::Identity => "IDENTITY",
            Self::Config => "CONFIG",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeScope {
    Local,
    Identity,
    Environment,
}

impl NodeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Identity => "IDENTITY",
            Self::Environment => "ENVIRONMENT",
        }
    }

    /// Identity-scoped writes require elevated authority; LOCAL is the default.
    pub fn requires_elevated_authority(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl std::fmt::Display for NodeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, versioned node in the graph store. Re-memorizing the same `id`
/// updates the row in place and increments `version`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
    pub scope: String,
    pub version: i64,
    pub attributes_json: String,
    pub created_at: String,
    pub updated_by: String,
    pub updated_at: String,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        scope: NodeScope,
        attributes: serde_json::Value,
        updated_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            node_type: node_type.as_str().to_string(),
            scope: scope.as_str().to_string(),
            version: 1,
            attributes_json: attributes.to_string(),
            created_at: now.clone(),
            updated_by: updated_by.into(),
            updated_at: now,
        }
    }

    pub fn attributes(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.attributes_json)
    }
}

/// An edge between two graph nodes. `edge_id` is a deterministic hash of
/// `source + target + relationship` so re-inserting the same logical edge is
/// idempotent (`INSERT OR IGNORE` at the storage layer).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GraphEdge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub scope: String,
    pub relationship: String,
    pub weight: f64,
    pub attributes_json: String,
}

impl GraphEdge {
    /// Deterministic edge id: `SHA-256(source|target|relationship)`.
    pub fn compute_id(source: &str, target: &str, relationship: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"|");
        hasher.update(target.as_bytes());
        hasher.update(b"|");
        hasher.update(relationship.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn new(
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
        scope: NodeScope,
        relationship: impl Into<String>,
        weight: f64,
        attributes: serde_json::Value,
    ) -> Self {
        let source_node_id = source_node_id.into();
        let target_node_id = target_node_id.into();
        let relationship = relationship.into();
        let edge_id = Self::compute_id(&source_node_id, &target_node_id, &relationship);
        Self {
            edge_id,
            source_node_id,
            target_node_id,
            scope: scope.as_str().to_string(),
            relationship,
            weight,
            attributes_json: attributes.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_id_is_deterministic() {
        let a = GraphEdge::compute_id("n1", "n2", "TEMPORAL_NEXT");
        let b = GraphEdge::compute_id("n1", "n2", "TEMPORAL_NEXT");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn edge_id_differs_by_relationship() {
        let a = GraphEdge::compute_id("n1", "n2", "TEMPORAL_NEXT");
        let b = GraphEdge::compute_id("n1", "n2", "TEMPORAL_PREV");
        assert_ne!(a, b);
    }

    #[test]
    fn identity_scope_requires_elevated_authority() {
        assert!(NodeScope::Identity.requires_elevated_authority());
        assert!(!NodeScope::Local.requires_elevated_authority());
    }

    #[test]
    fn node_attributes_round_trip() {
        let node = GraphNode::new(
            "concept_paris",
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({"content": "Paris is the capital of France"}),
            "memory_handler",
        );
        let attrs = node.attributes().unwrap();
        assert_eq!(attrs["content"], "Paris is the capital of France");
        assert_eq!(node.version, 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn edge_id_is_stable_across_runs(
                source in "[a-z0-9_]{1,32}",
                target in "[a-z0-9_]{1,32}",
                relationship in "[A-Z_]{1,24}",
            ) {
                let a = GraphEdge::compute_id(&source, &target, &relationship);
                let b = GraphEdge::compute_id(&source, &target, &relationship);
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.len(), 64);
            }

            #[test]
            fn edge_id_distinguishes_direction(
                source in "[a-z]{1,16}",
                target in "[a-z]{1,16}",
            ) {
                prop_assume!(source != target);
                let ab = GraphEdge::compute_id(&source, &target, "TEMPORAL_NEXT");
                let ba = GraphEdge::compute_id(&target, &source, "TEMPORAL_NEXT");
                prop_assert_ne!(ab, ba);
            }
        }
    }
}
