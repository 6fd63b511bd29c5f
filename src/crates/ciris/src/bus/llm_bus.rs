//! LLM bus: structured-generation calls used by evaluator steps in the pipeline.

use super::{ProviderTable, ServiceRegistry, ServiceType};
use crate::error::{CirisError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produces a JSON value matching the caller's expected schema shape.
    /// Providers are expected to validate and retry internally; the bus
    /// itself does not inspect the response.
    async fn structured_generate(&self, prompt: &str, schema_hint: &str) -> Result<serde_json::Value>;
}

pub struct LlmBus {
    registry: ServiceRegistry,
    providers: ProviderTable<dyn LlmProvider>,
}

impl LlmBus {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            providers: ProviderTable::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name, provider);
    }

    pub async fn structured_generate(&self, prompt: &str, schema_hint: &str) -> Result<serde_json::Value> {
        let handle = self
            .registry
            .get_services_by_type(ServiceType::Llm)
            .into_iter()
            .next()
            .ok_or_else(|| CirisError::NoProviderAvailable {
                service: "llm".to_string(),
            })?;
        let provider = self.providers.get(&handle.name).ok_or_else(|| CirisError::NoProviderAvailable {
            service: format!("llm provider not registered: {}", handle.name),
        })?;
        provider.structured_generate(prompt, schema_hint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ServiceHandle;

    struct StubLlm;

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn structured_generate(&self, prompt: &str, _schema_hint: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "echo": prompt }))
        }
    }

    #[tokio::test]
    async fn structured_generate_uses_the_registered_provider() {
        let registry = ServiceRegistry::new();
        registry.register(ServiceHandle::new("local_llm", ServiceType::Llm, vec!["generate".into()]));
        let mut bus = LlmBus::new(registry);
        bus.register_provider("local_llm", Arc::new(StubLlm));

        let result = bus.structured_generate("hello", "{}").await.unwrap();
        assert_eq!(result["echo"], "hello");
    }

    #[tokio::test]
    async fn no_provider_registered_is_reported() {
        let registry = ServiceRegistry::new();
        let bus = LlmBus::new(registry);
        assert!(bus.structured_generate("hi", "{}").await.is_err());
    }
}
