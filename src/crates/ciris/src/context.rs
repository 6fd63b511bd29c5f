//! Runtime context: the resource bag built once at process startup and
//! threaded through the CLI and the scheduler.

use crate::audit::AuditService;
use crate::bus::ServiceRegistry;
use crate::config::CirisConfig;
use crate::db::Database;
use crate::events::EventLogger;
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;

/// Built once in `bin/ciris.rs` and passed by reference into the CLI
/// commands and the scheduler's per-state processors.
#[derive(Clone)]
pub struct RuntimeContext {
    database: Arc<Database>,
    service_registry: Arc<ServiceRegistry>,
    audit: Arc<AuditService>,
    shutdown: ShutdownCoordinator,
    config: CirisConfig,
    event_logger: EventLogger,
}

impl RuntimeContext {
    pub fn new(
        database: Arc<Database>,
        service_registry: Arc<ServiceRegistry>,
        audit: Arc<AuditService>,
        shutdown: ShutdownCoordinator,
        config: CirisConfig,
    ) -> Self {
        Self {
            database,
            service_registry,
            audit,
            shutdown,
            config,
            event_logger: EventLogger::default(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_arc(&self) -> Arc<Database> {
        self.database.clone()
    }

    pub fn service_registry(&self) -> &ServiceRegistry {
        &self.service_registry
    }

    pub fn service_registry_arc(&self) -> Arc<ServiceRegistry> {
        self.service_registry.clone()
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    pub fn audit_arc(&self) -> Arc<AuditService> {
        self.audit.clone()
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn config(&self) -> &CirisConfig {
        &self.config
    }

    pub fn event_logger(&self) -> &EventLogger {
        &self.event_logger
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutdown_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::KeyManager;
    use crate::repositories::AuditRepository;
    use tempfile::tempdir;

    #[tokio::test]
    async fn accessors_expose_the_wired_components() {
        let db = Arc::new(Database::test_in_memory().await.unwrap());
        let key_dir = tempdir().unwrap();
        let audit_repo = AuditRepository::new(db.clone());
        let keys = KeyManager::load_or_generate(key_dir.path(), &audit_repo).await.unwrap();
        let audit = AuditService::new(audit_repo, keys);
        let registry = Arc::new(ServiceRegistry::new());
        let shutdown = ShutdownCoordinator::new();
        let config = CirisConfig::default();

        let context = RuntimeContext::new(db, registry, audit, shutdown, config);
        assert!(!context.is_shutting_down());
        context.shutdown().request_shutdown();
        assert!(context.is_shutting_down());
    }
}
