//! Health checks for the agent runtime: database connectivity, config
//! sanity, service-bus coverage, and archive-directory accessibility.

use crate::bus::{ServiceRegistry, ServiceType};
use crate::config::CirisConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: u64,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: Some("OK".to_string()),
            response_time_ms,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            response_time_ms,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
    pub total_response_time_ms: u64,
    pub timestamp: i64,
}

impl HealthReport {
    pub fn new(checks: Vec<ComponentHealth>) -> Self {
        let status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let total_response_time_ms = checks.iter().map(|c| c.response_time_ms).sum();
        let timestamp = chrono::Utc::now().timestamp();

        Self {
            status,
            checks,
            total_response_time_ms,
            timestamp,
        }
    }
}

pub struct HealthChecker;

impl HealthChecker {
    pub async fn check_database(db: &crate::db::Database) -> ComponentHealth {
        let start = Instant::now();
        match db.health_check().await {
            Ok(_) => ComponentHealth::healthy("database", start.elapsed().as_millis() as u64),
            Err(e) => ComponentHealth::unhealthy(
                "database",
                format!("database error: {}", e),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    pub fn check_config(config: &CirisConfig) -> ComponentHealth {
        let start = Instant::now();
        let mut issues = Vec::new();

        if config.guardrail.entropy_threshold < 0.0 || config.guardrail.entropy_threshold > 1.0 {
            issues.push("guardrail.entropy_threshold out of [0,1]".to_string());
        }
        if config.guardrail.coherence_threshold < 0.0 || config.guardrail.coherence_threshold > 1.0 {
            issues.push("guardrail.coherence_threshold out of [0,1]".to_string());
        }
        if config.scheduler.speed_multiplier_min >= config.scheduler.speed_multiplier_max {
            issues.push("scheduler.speed_multiplier_min must be less than speed_multiplier_max".to_string());
        }
        if config.audit.rsa_key_bits < 2048 {
            issues.push("audit.rsa_key_bits below the recommended 2048-bit minimum".to_string());
        }
        if config.adaptation.variance_threshold <= 0.0 {
            issues.push("adaptation.variance_threshold must be positive".to_string());
        }

        let response_time_ms = start.elapsed().as_millis() as u64;
        if issues.is_empty() {
            ComponentHealth::healthy("configuration", response_time_ms)
        } else {
            ComponentHealth::degraded("configuration", issues.join("; "), response_time_ms)
        }
    }

    /// Degraded (not unhealthy) when a bus has no registered providers -
    /// the agent can still run with a reduced capability set.
    pub fn check_service_registry(registry: &ServiceRegistry) -> ComponentHealth {
        let start = Instant::now();
        let required = [
            ServiceType::Communication,
            ServiceType::Memory,
            ServiceType::Tool,
            ServiceType::WiseAuthority,
            ServiceType::Llm,
        ];

        let empty: Vec<&str> = required
            .iter()
            .filter(|t| registry.get_services_by_type(**t).is_empty())
            .map(|t| t.as_str())
            .collect();

        let response_time_ms = start.elapsed().as_millis() as u64;
        if empty.is_empty() {
            ComponentHealth::healthy("service_registry", response_time_ms)
        } else {
            ComponentHealth::degraded(
                "service_registry",
                format!("no providers registered for: {}", empty.join(", ")),
                response_time_ms,
            )
        }
    }

    pub async fn check_archive_dir(path: &std::path::Path) -> ComponentHealth {
        let start = Instant::now();
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => {
                ComponentHealth::healthy("archive_dir", start.elapsed().as_millis() as u64)
            }
            Ok(_) => ComponentHealth::unhealthy(
                "archive_dir",
                "archive path exists but is not a directory",
                start.elapsed().as_millis() as u64,
            ),
            Err(_) => ComponentHealth::degraded(
                "archive_dir",
                "archive directory does not exist yet (created on first startup cleanup)",
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    pub async fn check_context(context: &crate::RuntimeContext) -> Result<HealthReport> {
        let mut checks = Vec::new();
        checks.push(Self::check_database(context.database()).await);
        checks.push(Self::check_config(context.config()));
        checks.push(Self::check_service_registry(context.service_registry()));
        checks.push(Self::check_archive_dir(std::path::Path::new(&context.config().maintenance.archive_dir)).await);
        Ok(HealthReport::new(checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_displays_lowercase() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn component_health_constructors_set_status() {
        assert_eq!(ComponentHealth::healthy("x", 1).status, HealthStatus::Healthy);
        assert_eq!(ComponentHealth::degraded("x", "warn", 1).status, HealthStatus::Degraded);
        assert_eq!(ComponentHealth::unhealthy("x", "err", 1).status, HealthStatus::Unhealthy);
    }

    #[test]
    fn report_status_is_the_worst_of_its_checks() {
        let all_healthy = HealthReport::new(vec![ComponentHealth::healthy("a", 1), ComponentHealth::healthy("b", 2)]);
        assert_eq!(all_healthy.status, HealthStatus::Healthy);
        assert_eq!(all_healthy.total_response_time_ms, 3);

        let one_degraded = HealthReport::new(vec![
            ComponentHealth::healthy("a", 1),
            ComponentHealth::degraded("b", "warn", 2),
        ]);
        assert_eq!(one_degraded.status, HealthStatus::Degraded);

        let one_unhealthy = HealthReport::new(vec![
            ComponentHealth::degraded("a", "warn", 1),
            ComponentHealth::unhealthy("b", "err", 2),
            ComponentHealth::healthy("c", 3),
        ]);
        assert_eq!(one_unhealthy.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn default_config_passes_the_sanity_checks() {
        let config = CirisConfig::default();
        let result = HealthChecker::check_config(&config);
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn misconfigured_speed_bounds_are_flagged() {
        let mut config = CirisConfig::default();
        config.scheduler.speed_multiplier_min = 5.0;
        config.scheduler.speed_multiplier_max = 1.0;
        let result = HealthChecker::check_config(&config);
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[test]
    fn empty_registry_is_degraded_not_unhealthy() {
        let registry = ServiceRegistry::new();
        let result = HealthChecker::check_service_registry(&registry);
        assert_eq!(result.status, HealthStatus::Degraded);
    }
}
