//! Wise authority bus: guidance requests and deferral escalation for DEFER actions.

use super::{ProviderTable, ServiceRegistry, ServiceType};
use crate::error::{CirisError, Result};
use crate::models::DeferralTicket;
use crate::repositories::DeferralRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait WiseAuthorityProvider: Send + Sync {
    async fn fetch_guidance(&self, context: &str) -> Result<Option<String>>;
    async fn send_deferral(&self, thought_id: &str, reason: &str) -> Result<bool>;
}

pub struct WiseAuthorityBus {
    registry: ServiceRegistry,
    providers: ProviderTable<dyn WiseAuthorityProvider>,
}

impl WiseAuthorityBus {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            providers: ProviderTable::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn WiseAuthorityProvider>) {
        self.providers.insert(name, provider);
    }

    fn resolve(&self) -> Result<Arc<dyn WiseAuthorityProvider>> {
        let handle = self
            .registry
            .get_services_by_type(ServiceType::WiseAuthority)
            .into_iter()
            .next()
            .ok_or_else(|| CirisError::NoProviderAvailable {
                service: "wise_authority".to_string(),
            })?;
        self.providers.get(&handle.name).ok_or_else(|| CirisError::NoProviderAvailable {
            service: format!("wise authority provider not registered: {}", handle.name),
        })
    }

    pub async fn fetch_guidance(&self, context: &str) -> Result<Option<String>> {
        self.resolve()?.fetch_guidance(context).await
    }

    pub async fn send_deferral(&self, thought_id: &str, reason: &str) -> Result<bool> {
        self.resolve()?.send_deferral(thought_id, reason).await
    }
}

/// The built-in provider: persists each deferral as an open ticket for a
/// human to pick up out of band. It offers no live guidance channel, so
/// `fetch_guidance` always comes back empty.
pub struct PersistedDeferralAuthority {
    deferrals: DeferralRepository,
}

impl PersistedDeferralAuthority {
    pub fn new(deferrals: DeferralRepository) -> Self {
        Self { deferrals }
    }
}

#[async_trait]
impl WiseAuthorityProvider for PersistedDeferralAuthority {
    async fn fetch_guidance(&self, _context: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn send_deferral(&self, thought_id: &str, reason: &str) -> Result<bool> {
        let ticket = DeferralTicket::new(thought_id, reason, serde_json::json!({}));
        self.deferrals.save(&ticket).await?;
        info!(deferral_id = %ticket.deferral_id, thought_id, "deferral ticket persisted");
        Ok(true)
    }
}
