//! `ciris speak <channel> <content>` - dispatches a SPEAK action through the
//! communication bus. Routes through the `cli_*` channel prefix; since a
//! one-shot CLI invocation has no long-lived adapter to register against,
//! this command registers a stdout provider for the call and tears it down
//! when it returns.

use crate::audit::AuditEvent;
use crate::bus::{CommunicationBus, CommunicationProvider, ServiceHandle, ServiceType};
use crate::error::Result;
use crate::RuntimeContext;
use async_trait::async_trait;
use std::sync::Arc;

struct StdoutProvider;

#[async_trait]
impl CommunicationProvider for StdoutProvider {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<bool> {
        println!("[{}] {}", channel_id, content);
        Ok(true)
    }

    async fn fetch_messages(&self, _channel_id: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub async fn run(context: &RuntimeContext, channel: &str, content: &str) -> Result<()> {
    let registry = context.service_registry().clone();
    registry.register(ServiceHandle::new(
        "cli",
        ServiceType::Communication,
        vec!["send_message".into()],
    ));

    let mut bus = CommunicationBus::new(registry);
    bus.register_provider("cli", Arc::new(StdoutProvider));

    let channel_id = format!("cli_{}", channel);
    let delivered = bus.send_message_sync(&channel_id, content).await?;

    context
        .audit()
        .append(AuditEvent::new(
            "speak",
            "cli",
            serde_json::json!({ "channel_id": channel_id, "content": content, "delivered": delivered }),
        ))
        .await?;

    Ok(())
}
