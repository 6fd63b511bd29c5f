//! `ciris recall <query>` - substring search over memorized graph nodes.

use crate::audit::AuditEvent;
use crate::memory::MemoryService;
use crate::repositories::GraphRepository;
use crate::{Result, RuntimeContext};

pub async fn run(context: &RuntimeContext, query: &str) -> Result<()> {
    let memory = MemoryService::new(GraphRepository::new(context.database_arc()));
    let matches = memory.search(query, 10).await?;

    context
        .audit()
        .append(AuditEvent::new(
            "recall",
            "cli",
            serde_json::json!({ "query": query, "matches": matches.len() }),
        ))
        .await?;

    if matches.is_empty() {
        println!("no nodes matched \"{}\"", query);
        return Ok(());
    }

    for node in &matches {
        let attrs = node.attributes().unwrap_or(serde_json::json!({}));
        println!("{}  {}  {}", node.id, node.node_type, attrs);
    }
    Ok(())
}
