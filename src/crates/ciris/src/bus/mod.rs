//! Typed service buses.
//!
//! Every handler action that crosses a service boundary - speaking,
//! memorizing, calling a tool - goes through exactly one bus. Each bus wraps
//! a [`ServiceRegistry`] lookup and offers two calling conventions: a
//! synchronous call that blocks on the provider's result, and (where the
//! result is never observed by the caller) a fire-and-forget call that
//! queues onto a background worker so the pipeline round isn't blocked on
//! adapter I/O.

mod communication_bus;
mod llm_bus;
mod memory_bus;
mod registry;
mod tool_bus;
mod wise_authority_bus;

pub use communication_bus::{CommunicationBus, CommunicationProvider};
pub use llm_bus::{LlmBus, LlmProvider};
pub use memory_bus::{MemoryBus, MemoryProvider, MemoryQuery};
pub use registry::{ServiceHandle, ServiceRegistry, ServiceType};
pub use tool_bus::{ToolBus, ToolProvider};
pub use wise_authority_bus::{PersistedDeferralAuthority, WiseAuthorityBus, WiseAuthorityProvider};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A unit of work queued onto a bus's background worker.
#[async_trait]
pub trait QueuedWork: Send + Sync + 'static {
    async fn run(self: Box<Self>) -> Result<()>;
    fn label(&self) -> &str;
}

/// Shared plumbing every bus embeds: a provider table keyed by registered
/// name, and an unbounded queue drained by a single worker task so queued
/// work is processed in submission order.
pub struct BaseBus {
    queue_tx: mpsc::UnboundedSender<Box<dyn QueuedWork>>,
}

impl BaseBus {
    pub fn new() -> Self {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Box<dyn QueuedWork>>();

        tokio::spawn(async move {
            while let Some(work) = queue_rx.recv().await {
                let label = work.label().to_string();
                if let Err(e) = work.run().await {
                    error!(work = %label, error = %e, "queued bus work failed");
                } else {
                    debug!(work = %label, "queued bus work completed");
                }
            }
        });

        Self { queue_tx }
    }

    pub fn enqueue(&self, work: Box<dyn QueuedWork>) -> Result<()> {
        self.queue_tx
            .send(work)
            .map_err(|_| crate::error::CirisError::Other("bus worker has shut down".into()))
    }
}

impl Default for BaseBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BaseBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseBus").finish_non_exhaustive()
    }
}

/// Holds the live provider instances a bus can route to, separate from the
/// registry (which only tracks names, types and capabilities).
pub(crate) struct ProviderTable<P: ?Sized> {
    providers: HashMap<String, Arc<P>>,
}

impl<P: ?Sized> ProviderTable<P> {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<P>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<P>> {
        self.providers.get(name).cloned()
    }
}

impl<P: ?Sized> Default for ProviderTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
