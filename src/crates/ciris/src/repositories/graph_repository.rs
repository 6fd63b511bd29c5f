//! Graph repository: nodes and edges backing memory and consolidation.

use crate::db::Database;
use crate::error::{CirisError, Result};
use crate::models::{GraphEdge, GraphNode};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct GraphRepository {
    db: Arc<Database>,
}

impl GraphRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new node, or if `id` already exists, overwrite its
    /// attributes and bump `version` - the same semantics as re-MEMORIZEing.
    pub async fn upsert_node(&self, node: &GraphNode) -> Result<i64> {
        let existing = self.find_node(&node.id).await?;
        let updated_at = Utc::now().to_rfc3339();

        match existing {
            Some(current) => {
                let new_version = current.version + 1;
                sqlx::query(
                    "UPDATE graph_nodes SET node_type = ?, scope = ?, version = ?,
                        attributes_json = ?, updated_by = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&node.node_type)
                .bind(&node.scope)
                .bind(new_version)
                .bind(&node.attributes_json)
                .bind(&node.updated_by)
                .bind(&updated_at)
                .bind(&node.id)
                .execute(self.db.pool())
                .await
                .map_err(|e| CirisError::Database(format!("failed to update node: {}", e)))?;
                Ok(new_version)
            }
            None => {
                sqlx::query(
                    "INSERT INTO graph_nodes (id, node_type, scope, version, attributes_json,
                        created_at, updated_by, updated_at) VALUES (?, ?, ?, 1, ?, ?, ?, ?)",
                )
                .bind(&node.id)
                .bind(&node.node_type)
                .bind(&node.scope)
                .bind(&node.attributes_json)
                .bind(&node.created_at)
                .bind(&node.updated_by)
                .bind(&node.updated_at)
                .execute(self.db.pool())
                .await
                .map_err(|e| CirisError::Database(format!("failed to insert node: {}", e)))?;
                Ok(1)
            }
        }
    }

    pub async fn find_node(&self, id: &str) -> Result<Option<GraphNode>> {
        sqlx::query_as::<_, GraphNode>("SELECT * FROM graph_nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to load node: {}", e)))
    }

    pub async fn list_nodes_by_type(&self, node_type: &str) -> Result<Vec<GraphNode>> {
        sqlx::query_as::<_, GraphNode>("SELECT * FROM graph_nodes WHERE node_type = ?")
            .bind(node_type)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to list nodes by type: {}", e)))
    }

    pub async fn search_nodes(&self, query_substring: &str, limit: i64) -> Result<Vec<GraphNode>> {
        let pattern = format!("%{}%", query_substring);
        sqlx::query_as::<_, GraphNode>(
            "SELECT * FROM graph_nodes WHERE attributes_json LIKE ? ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to search nodes: {}", e)))
    }

    pub async fn delete_node(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM graph_nodes WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to delete node: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(CirisError::NotFound(format!("node not found: {}", id)));
        }
        Ok(())
    }

    /// Idempotent edge insert: silently no-ops if `edge_id` already exists.
    pub async fn insert_edge_or_ignore(&self, edge: &GraphEdge) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO graph_edges (edge_id, source_node_id, target_node_id,
                scope, relationship, weight, attributes_json) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&edge.edge_id)
        .bind(&edge.source_node_id)
        .bind(&edge.target_node_id)
        .bind(&edge.scope)
        .bind(&edge.relationship)
        .bind(edge.weight)
        .bind(&edge.attributes_json)
        .execute(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to insert edge: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn edges_from(&self, source_node_id: &str) -> Result<Vec<GraphEdge>> {
        sqlx::query_as::<_, GraphEdge>("SELECT * FROM graph_edges WHERE source_node_id = ?")
            .bind(source_node_id)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to list outgoing edges: {}", e)))
    }

    pub async fn edges_touching(&self, node_id: &str) -> Result<Vec<GraphEdge>> {
        sqlx::query_as::<_, GraphEdge>(
            "SELECT * FROM graph_edges WHERE source_node_id = ? OR target_node_id = ?",
        )
        .bind(node_id)
        .bind(node_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to list touching edges: {}", e)))
    }

    /// Edges dangling from a node deleted without its edges - consolidation
    /// sweeps these up after folding raw nodes into summaries.
    pub async fn find_orphaned_edges(&self) -> Result<Vec<GraphEdge>> {
        sqlx::query_as::<_, GraphEdge>(
            "SELECT e.* FROM graph_edges e
             LEFT JOIN graph_nodes s ON e.source_node_id = s.id
             LEFT JOIN graph_nodes t ON e.target_node_id = t.id
             WHERE s.id IS NULL OR t.id IS NULL",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| CirisError::Database(format!("failed to find orphaned edges: {}", e)))
    }

    pub async fn delete_edges(&self, edge_ids: &[String]) -> Result<u64> {
        if edge_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = edge_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM graph_edges WHERE edge_id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in edge_ids {
            query = query.bind(id);
        }
        let result = query
            .execute(self.db.pool())
            .await
            .map_err(|e| CirisError::Database(format!("failed to delete edges: {}", e)))?;
        Ok(result.rows_affected())
    }
}
