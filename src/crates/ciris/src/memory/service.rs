//! The in-process graph store: the sole [`MemoryProvider`] implementation.

use crate::bus::{MemoryProvider, MemoryQuery};
use crate::error::{CirisError, Result};
use crate::models::{GraphNode, NodeScope};
use crate::repositories::GraphRepository;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Backs the memory bus with the relational graph store. Identity-scoped
/// writes require an elevated-authority flag the caller must already hold;
/// this service enforces the check but does not itself grant authority.
pub struct MemoryService {
    graph: GraphRepository,
}

impl MemoryService {
    pub fn new(graph: GraphRepository) -> Self {
        Self { graph }
    }

    pub async fn memorize_with_authority(&self, node: GraphNode, has_elevated_authority: bool) -> Result<i64> {
        let scope = node
            .scope
            .parse::<ScopeGuard>()
            .map_err(|e| CirisError::Other(e))?;
        if scope.0.requires_elevated_authority() && !has_elevated_authority {
            return Err(CirisError::Other(format!(
                "writing to {} scope requires elevated authority",
                node.scope
            )));
        }
        self.graph.upsert_node(&node).await
    }

    pub async fn search(&self, query_text: &str, limit: i64) -> Result<Vec<GraphNode>> {
        self.graph.search_nodes(query_text, limit).await
    }
}

struct ScopeGuard(NodeScope);

impl std::str::FromStr for ScopeGuard {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "LOCAL" => Ok(ScopeGuard(NodeScope::Local)),
            "IDENTITY" => Ok(ScopeGuard(NodeScope::Identity)),
            "ENVIRONMENT" => Ok(ScopeGuard(NodeScope::Environment)),
            other => Err(format!("unknown node scope: {}", other)),
        }
    }
}

#[async_trait]
impl MemoryProvider for MemoryService {
    async fn memorize(&self, node: GraphNode) -> Result<i64> {
        // Handlers acting without an explicit authority token write at LOCAL
        // scope; IDENTITY-scoped writes must go through
        // `memorize_with_authority` directly.
        if node.scope == NodeScope::Identity.as_str() {
            warn!(node_id = %node.id, "rejecting identity-scoped memorize via the default bus path");
            return Err(CirisError::Other(
                "identity-scoped memorize requires elevated authority".into(),
            ));
        }
        debug!(node_id = %node.id, "memorizing node");
        self.graph.upsert_node(&node).await
    }

    async fn recall(&self, query: MemoryQuery) -> Result<Vec<GraphNode>> {
        if let Some(prefix) = &query.id_prefix {
            if prefix == "*" {
                return match &query.node_type {
                    Some(node_type) => self.graph.list_nodes_by_type(node_type).await,
                    None => self.graph.search_nodes("", query.limit.max(1)).await,
                };
            }
            return self.graph.search_nodes(prefix, query.limit.max(1)).await;
        }
        Ok(Vec::new())
    }

    async fn forget(&self, node_id: &str, reason: &str) -> Result<()> {
        debug!(node_id = %node_id, reason = %reason, "forgetting node");
        self.graph.delete_node(node_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NodeType;
    use std::sync::Arc;

    async fn service() -> MemoryService {
        let db = Database::test_in_memory().await.unwrap();
        MemoryService::new(GraphRepository::new(Arc::new(db)))
    }

    #[tokio::test]
    async fn identity_scope_rejected_without_authority() {
        let service = service().await;
        let node = GraphNode::new(
            "core_identity",
            NodeType::Identity,
            NodeScope::Identity,
            serde_json::json!({}),
            "identity_handler",
        );
        assert!(service.memorize(node).await.is_err());
    }

    #[tokio::test]
    async fn identity_scope_allowed_with_elevated_authority() {
        let service = service().await;
        let node = GraphNode::new(
            "core_identity",
            NodeType::Identity,
            NodeScope::Identity,
            serde_json::json!({}),
            "identity_handler",
        );
        let version = service.memorize_with_authority(node, true).await.unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn wildcard_recall_filters_by_type() {
        let service = service().await;
        service
            .memorize(GraphNode::new(
                "concept_a",
                NodeType::Concept,
                NodeScope::Local,
                serde_json::json!({}),
                "h",
            ))
            .await
            .unwrap();
        service
            .memorize(GraphNode::new(
                "user_b",
                NodeType::User,
                NodeScope::Local,
                serde_json::json!({}),
                "h",
            ))
            .await
            .unwrap();

        let query = MemoryQuery {
            id_prefix: Some("*".to_string()),
            scope: None,
            node_type: Some("CONCEPT".to_string()),
            limit: 10,
        };
        let results = service.recall(query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "concept_a");
    }
}
