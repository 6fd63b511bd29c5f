//! Memory bus: MEMORIZE / RECALL / FORGET routing to the graph store.

use super::{ProviderTable, ServiceRegistry, ServiceType};
use crate::error::{CirisError, Result};
use crate::models::GraphNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Query shape accepted by [`MemoryProvider::recall`]: an optional id
/// prefix, scope, and node-type filter, capped by `limit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub id_prefix: Option<String>,
    pub scope: Option<String>,
    pub node_type: Option<String>,
    pub limit: i64,
}

impl MemoryQuery {
    pub fn by_prefix(id_prefix: impl Into<String>, limit: i64) -> Self {
        Self {
            id_prefix: Some(id_prefix.into()),
            scope: None,
            node_type: None,
            limit,
        }
    }
}

/// The single in-process graph store implementation registers as this
/// provider; kept as a trait (rather than a direct dependency) so the bus
/// stays agnostic to storage and the memory service can be swapped in tests.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn memorize(&self, node: GraphNode) -> Result<i64>;
    async fn recall(&self, query: MemoryQuery) -> Result<Vec<GraphNode>>;
    async fn forget(&self, node_id: &str, reason: &str) -> Result<()>;
}

pub struct MemoryBus {
    registry: ServiceRegistry,
    providers: ProviderTable<dyn MemoryProvider>,
}

impl MemoryBus {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            providers: ProviderTable::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn MemoryProvider>) {
        self.providers.insert(name, provider);
    }

    fn resolve(&self, capability: &str) -> Result<Arc<dyn MemoryProvider>> {
        let handle = self
            .registry
            .find_capable(ServiceType::Memory, &[capability])
            .ok_or_else(|| CirisError::NoProviderAvailable {
                service: format!("memory ({})", capability),
            })?;
        self.providers.get(&handle.name).ok_or_else(|| {
            CirisError::NoProviderAvailable {
                service: format!("memory provider not registered: {}", handle.name),
            }
        })
    }

    /// Memory operations are always synchronous: handlers need the result
    /// (the stored node's new version, or the recalled set) before they can
    /// decide on a final action.
    pub async fn memorize(&self, node: GraphNode) -> Result<i64> {
        let provider = self.resolve("memorize")?;
        provider.memorize(node).await.map_err(|e| {
            error!(error = %e, "memorize failed");
            e
        })
    }

    pub async fn recall(&self, query: MemoryQuery) -> Result<Vec<GraphNode>> {
        let provider = self.resolve("recall")?;
        provider.recall(query).await
    }

    pub async fn forget(&self, node_id: &str, reason: &str) -> Result<()> {
        let provider = self.resolve("forget")?;
        provider.forget(node_id, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ServiceHandle;
    use crate::models::{NodeScope, NodeType};
    use std::sync::Mutex;

    struct FakeMemory {
        nodes: Mutex<Vec<GraphNode>>,
    }

    #[async_trait]
    impl MemoryProvider for FakeMemory {
        async fn memorize(&self, node: GraphNode) -> Result<i64> {
            let version = node.version;
            self.nodes.lock().unwrap().push(node);
            Ok(version)
        }

        async fn recall(&self, query: MemoryQuery) -> Result<Vec<GraphNode>> {
            let nodes = self.nodes.lock().unwrap();
            Ok(nodes
                .iter()
                .filter(|n| {
                    query
                        .id_prefix
                        .as_ref()
                        .map(|p| n.id.starts_with(p.as_str()))
                        .unwrap_or(true)
                })
                .take(query.limit.max(1) as usize)
                .cloned()
                .collect())
        }

        async fn forget(&self, node_id: &str, _reason: &str) -> Result<()> {
            self.nodes.lock().unwrap().retain(|n| n.id != node_id);
            Ok(())
        }
    }

    fn bus_with_provider() -> MemoryBus {
        let registry = ServiceRegistry::new();
        registry.register(ServiceHandle::new(
            "graph_store",
            ServiceType::Memory,
            vec!["memorize".into(), "recall".into(), "forget".into()],
        ));
        let mut bus = MemoryBus::new(registry);
        bus.register_provider(
            "graph_store",
            Arc::new(FakeMemory { nodes: Mutex::new(Vec::new()) }),
        );
        bus
    }

    #[tokio::test]
    async fn memorize_then_recall_round_trips() {
        let bus = bus_with_provider();
        let node = GraphNode::new(
            "concept_paris",
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({"content": "Paris"}),
            "memory_handler",
        );
        bus.memorize(node).await.unwrap();

        let results = bus.recall(MemoryQuery::by_prefix("concept_", 10)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "concept_paris");
    }

    #[tokio::test]
    async fn forget_removes_the_node() {
        let bus = bus_with_provider();
        let node = GraphNode::new(
            "concept_paris",
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({}),
            "memory_handler",
        );
        bus.memorize(node).await.unwrap();
        bus.forget("concept_paris", "superseded").await.unwrap();

        let results = bus.recall(MemoryQuery::by_prefix("concept_", 10)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn missing_provider_is_reported() {
        let registry = ServiceRegistry::new();
        let bus = MemoryBus::new(registry);
        let node = GraphNode::new(
            "x",
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({}),
            "memory_handler",
        );
        assert!(bus.memorize(node).await.is_err());
    }
}
