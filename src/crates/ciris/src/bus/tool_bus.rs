//! Tool bus: advertises and executes named tools with typed parameters.

use super::{ProviderTable, ServiceRegistry, ServiceType};
use crate::error::{CirisError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn list_tools(&self) -> Vec<String>;
    async fn execute(&self, name: &str, params: HashMap<String, serde_json::Value>) -> Result<serde_json::Value>;
}

pub struct ToolBus {
    registry: ServiceRegistry,
    providers: ProviderTable<dyn ToolProvider>,
}

impl ToolBus {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            providers: ProviderTable::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(name, provider);
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.registry
            .get_services_by_type(ServiceType::Tool)
            .into_iter()
            .filter_map(|h| self.providers.get(&h.name))
            .flat_map(|p| p.list_tools())
            .collect()
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let handle = self
            .registry
            .find_capable(ServiceType::Tool, &[tool_name])
            .ok_or_else(|| CirisError::NoProviderAvailable {
                service: format!("tool {}", tool_name),
            })?;
        let provider = self.providers.get(&handle.name).ok_or_else(|| {
            CirisError::NoProviderAvailable {
                service: format!("tool provider not registered: {}", handle.name),
            }
        })?;
        provider.execute(tool_name, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ServiceHandle;

    struct EchoTool;

    #[async_trait]
    impl ToolProvider for EchoTool {
        fn list_tools(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn execute(&self, _name: &str, params: HashMap<String, serde_json::Value>) -> Result<serde_json::Value> {
            Ok(serde_json::json!(params))
        }
    }

    #[tokio::test]
    async fn execute_routes_by_capability() {
        let registry = ServiceRegistry::new();
        registry.register(ServiceHandle::new("echo_tool", ServiceType::Tool, vec!["echo".into()]));
        let mut bus = ToolBus::new(registry);
        bus.register_provider("echo_tool", Arc::new(EchoTool));

        let mut params = HashMap::new();
        params.insert("message".to_string(), serde_json::json!("hi"));
        let result = bus.execute("echo", params).await.unwrap();
        assert_eq!(result["message"], "hi");
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let registry = ServiceRegistry::new();
        let bus = ToolBus::new(registry);
        assert!(bus.execute("nonexistent", HashMap::new()).await.is_err());
    }
}
