//! Configuration loader with dual-location support.
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: `~/.ciris/ciris.toml`
//! 3. Project-level config: `./.ciris/ciris.toml`
//!
//! Later configs override earlier ones.

use crate::config::schema::CirisConfig;
use crate::error::{CirisError, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Loads configuration from both user and project locations.
pub struct ConfigLoader {
    user_config_path: PathBuf,
    project_config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: Self::user_config_path(),
            project_config_path: Self::project_config_path(),
        }
    }

    fn user_config_path() -> PathBuf {
        dirs::home_dir()
            .expect("failed to resolve home directory")
            .join(".ciris")
            .join("ciris.toml")
    }

    fn project_config_path() -> PathBuf {
        std::env::current_dir()
            .expect("failed to resolve current directory")
            .join(".ciris")
            .join("ciris.toml")
    }

    /// Load configuration, merging user config under project config.
    pub async fn load(&self) -> Result<CirisConfig> {
        let mut config = CirisConfig::default();
        info!("loading configuration with defaults");

        match self.load_from_path(&self.user_config_path).await {
            Ok(user_config) => {
                debug!(path = %self.user_config_path.display(), "loaded user-level config");
                config.merge(user_config);
            }
            Err(e) => {
                debug!(
                    path = %self.user_config_path.display(),
                    error = %e,
                    "user-level config not found, using defaults"
                );
            }
        }

        match self.load_from_path(&self.project_config_path).await {
            Ok(project_config) => {
                debug!(path = %self.project_config_path.display(), "loaded project-level config");
                config.merge(project_config);
            }
            Err(e) => {
                debug!(
                    path = %self.project_config_path.display(),
                    error = %e,
                    "project-level config not found"
                );
            }
        }

        info!("configuration loaded successfully");
        Ok(config)
    }

    async fn load_from_path(&self, path: &PathBuf) -> Result<CirisConfig> {
        if !path.exists() {
            return Err(CirisError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CirisError::Config(format!("failed to read config: {}", e)))?;

        let config: CirisConfig = toml::from_str(&content)
            .map_err(|e| CirisError::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    pub fn user_config_path_ref(&self) -> &PathBuf {
        &self.user_config_path
    }

    pub fn project_config_path_ref(&self) -> &PathBuf {
        &self.project_config_path
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
