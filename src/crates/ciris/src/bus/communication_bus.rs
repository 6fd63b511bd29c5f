//! Communication bus: SPEAK and OBSERVE routing to channel adapters.

use super::{BaseBus, ProviderTable, QueuedWork, ServiceRegistry, ServiceType};
use crate::error::{CirisError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A channel adapter capable of sending and fetching messages (CLI, Discord,
/// the API surface, ...). Each registered provider owns one [`ServiceHandle`]
/// name; channel ids are expected to carry that name as a `{name}_` prefix.
#[async_trait]
pub trait CommunicationProvider: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<bool>;
    async fn fetch_messages(&self, channel_id: &str, limit: usize) -> Result<Vec<String>>;
}

struct SendMessageWork {
    provider: Arc<dyn CommunicationProvider>,
    channel_id: String,
    content: String,
}

#[async_trait]
impl QueuedWork for SendMessageWork {
    async fn run(self: Box<Self>) -> Result<()> {
        let ok = self.provider.send_message(&self.channel_id, &self.content).await?;
        if !ok {
            warn!(channel_id = %self.channel_id, "adapter reported send_message failure");
        }
        Ok(())
    }

    fn label(&self) -> &str {
        "send_message"
    }
}

pub struct CommunicationBus {
    registry: ServiceRegistry,
    providers: ProviderTable<dyn CommunicationProvider>,
    base: BaseBus,
}

impl CommunicationBus {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            providers: ProviderTable::new(),
            base: BaseBus::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn CommunicationProvider>) {
        self.providers.insert(name, provider);
    }

    fn resolve(&self, channel_id: &str) -> Option<Arc<dyn CommunicationProvider>> {
        if let Some(handle) = self
            .registry
            .find_by_channel_prefix(ServiceType::Communication, channel_id)
        {
            if let Some(provider) = self.providers.get(&handle.name) {
                return Some(provider);
            }
        }
        let fallback = self
            .registry
            .find_capable(ServiceType::Communication, &["send_message"])?;
        self.providers.get(&fallback.name)
    }

    /// Queue a SPEAK action for delivery; returns once queued, not once delivered.
    pub fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let provider = self.resolve(channel_id).ok_or_else(|| {
            CirisError::NoProviderAvailable {
                service: format!("communication for channel {}", channel_id),
            }
        })?;

        debug!(channel_id = %channel_id, "queuing send_message");
        self.base.enqueue(Box::new(SendMessageWork {
            provider,
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        }))
    }

    /// Block until the message is delivered - used when a caller (e.g. the
    /// emergency shutdown path) must know the outcome immediately.
    pub async fn send_message_sync(&self, channel_id: &str, content: &str) -> Result<bool> {
        let provider = self.resolve(channel_id).ok_or_else(|| {
            CirisError::NoProviderAvailable {
                service: format!("communication for channel {}", channel_id),
            }
        })?;
        provider.send_message(channel_id, content).await.map_err(|e| {
            error!(channel_id = %channel_id, error = %e, "send_message_sync failed");
            e
        })
    }

    pub async fn fetch_messages(&self, channel_id: &str, limit: usize) -> Result<Vec<String>> {
        let provider = self.resolve(channel_id).ok_or_else(|| {
            CirisError::NoProviderAvailable {
                service: format!("communication for channel {}", channel_id),
            }
        })?;
        provider.fetch_messages(channel_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ServiceHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingProvider {
        sent: Mutex<Vec<(String, String)>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommunicationProvider for RecordingProvider {
        async fn send_message(&self, channel_id: &str, content: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), content.to_string()));
            Ok(true)
        }

        async fn fetch_messages(&self, _channel_id: &str, _limit: usize) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn bus_with_cli_provider() -> (CommunicationBus, Arc<RecordingProvider>) {
        let registry = ServiceRegistry::new();
        registry.register(ServiceHandle::new(
            "cli",
            ServiceType::Communication,
            vec!["send_message".into()],
        ));
        let mut bus = CommunicationBus::new(registry);
        let provider = Arc::new(RecordingProvider {
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        bus.register_provider("cli", provider.clone());
        (bus, provider)
    }

    #[tokio::test]
    async fn sync_send_routes_by_channel_prefix() {
        let (bus, provider) = bus_with_cli_provider();
        let ok = bus.send_message_sync("cli_local", "hello").await.unwrap();
        assert!(ok);
        assert_eq!(provider.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_provider_for_channel_errors() {
        let registry = ServiceRegistry::new();
        let bus = CommunicationBus::new(registry);
        let result = bus.send_message_sync("discord_general", "hi").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn queued_send_eventually_reaches_provider() {
        let (bus, provider) = bus_with_cli_provider();
        bus.send_message("cli_local", "queued").unwrap();

        for _ in 0..50 {
            if provider.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
