//! Configuration management for CIRIS.
//!
//! Supports dual-location configuration:
//! - User-level: `~/.ciris/ciris.toml`
//! - Project-level: `./.ciris/ciris.toml`
//!
//! Project-level config overrides user-level config.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AdaptationConfig, AuditConfig, CirisConfig, DatabaseConfig, GuardrailConfig, LoggingConfig,
    MaintenanceConfig, SchedulerConfig,
};

use crate::Result;

/// Load configuration from both locations with project config taking precedence.
///
/// Priority order:
/// 1. Default values
/// 2. User-level config (`~/.ciris/ciris.toml`)
/// 3. Project-level config (`./.ciris/ciris.toml`)
pub async fn load_config() -> Result<CirisConfig> {
    let loader = ConfigLoader::new();
    loader.load().await
}
