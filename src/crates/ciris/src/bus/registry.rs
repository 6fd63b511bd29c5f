//! Service registry: capability-aware lookup used by every bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Communication,
    Memory,
    Tool,
    WiseAuthority,
    Llm,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Communication => "COMMUNICATION",
            Self::Memory => "MEMORY",
            Self::Tool => "TOOL",
            Self::WiseAuthority => "WISE_AUTHORITY",
            Self::Llm => "LLM",
        }
    }
}

/// A handle to a concrete provider registered under a [`ServiceType`].
///
/// `name` is matched against a channel-id prefix by buses that need
/// cross-adapter routing (communication); `capabilities` gate which
/// operations a handler may invoke through this provider.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub name: String,
    pub service_type: ServiceType,
    pub capabilities: Vec<String>,
    pub priority: i32,
}

impl ServiceHandle {
    pub fn new(
        name: impl Into<String>,
        service_type: ServiceType,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type,
            capabilities,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Thread-safe table of registered service providers, keyed by [`ServiceType`].
///
/// Providers with the same type are ordered by descending priority so a bus
/// asking for "the" service gets a deterministic, preferred choice while
/// still allowing channel-prefix routing to pick a specific one by name.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<&'static str, Vec<ServiceHandle>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, handle: ServiceHandle) {
        let mut services = self.services.write().expect("service registry poisoned");
        let bucket = services.entry(handle.service_type.as_str()).or_default();
        bucket.push(handle);
        bucket.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn get_services_by_type(&self, service_type: ServiceType) -> Vec<ServiceHandle> {
        let services = self.services.read().expect("service registry poisoned");
        services
            .get(service_type.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Highest-priority provider offering every capability in `required`.
    pub fn find_capable(
        &self,
        service_type: ServiceType,
        required: &[&str],
    ) -> Option<ServiceHandle> {
        self.get_services_by_type(service_type)
            .into_iter()
            .find(|h| required.iter().all(|cap| h.supports(cap)))
    }

    /// Provider whose registered `name` matches a channel-id prefix, e.g.
    /// `"discord_"` routes to the provider named `"discord"`.
    pub fn find_by_channel_prefix(
        &self,
        service_type: ServiceType,
        channel_id: &str,
    ) -> Option<ServiceHandle> {
        let handles = self.get_services_by_type(service_type);
        for handle in &handles {
            let prefix = format!("{}_", handle.name);
            if channel_id.starts_with(&prefix) {
                return Some(handle.clone());
            }
        }
        None
    }
}
