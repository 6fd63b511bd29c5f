//! `ciris memorize <content>` - stores a CONCEPT node at LOCAL scope and
//! records the write in the audit chain.

use crate::audit::AuditEvent;
use crate::memory::MemoryService;
use crate::models::{GraphNode, NodeScope, NodeType};
use crate::repositories::GraphRepository;
use crate::{Result, RuntimeContext};
use uuid::Uuid;

pub async fn run(context: &RuntimeContext, content: &str) -> Result<()> {
    let memory = MemoryService::new(GraphRepository::new(context.database_arc()));

    let node_id = format!("concept_{}", Uuid::new_v4());
    let node = GraphNode::new(
        node_id.clone(),
        NodeType::Concept,
        NodeScope::Local,
        serde_json::json!({ "content": content }),
        "cli",
    );
    memory.memorize_with_authority(node, false).await?;

    context
        .audit()
        .append(AuditEvent::new(
            "memorize",
            "cli",
            serde_json::json!({ "node_id": node_id, "content": content }),
        ))
        .await?;

    println!("memorized CONCEPT node {}", node_id);
    Ok(())
}
