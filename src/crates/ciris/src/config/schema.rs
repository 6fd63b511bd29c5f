//! Configuration schema for the CIRIS agent core.

use serde::{Deserialize, Serialize};

/// Top-level CIRIS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CirisConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub guardrail: GuardrailConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(default)]
    pub adaptation: AdaptationConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to `~/.ciris` or absolute).
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "ciris.db".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Audit chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Directory holding `audit_private.pem` (0600) and `audit_public.pem`.
    pub key_dir: String,

    /// RSA key size in bits for newly generated signing keys.
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,
}

fn default_rsa_key_bits() -> usize {
    2048
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            key_dir: "keys".to_string(),
            rsa_key_bits: default_rsa_key_bits(),
        }
    }
}

/// Cognitive scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_work_delay")]
    pub work_round_delay_secs: f64,

    #[serde(default = "default_solitude_delay")]
    pub solitude_round_delay_secs: f64,

    #[serde(default = "default_dream_delay")]
    pub dream_round_delay_secs: f64,

    #[serde(default = "default_speed_min")]
    pub speed_multiplier_min: f64,

    #[serde(default = "default_speed_max")]
    pub speed_multiplier_max: f64,

    #[serde(default = "default_emergency_threshold")]
    pub emergency_failure_threshold: u32,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_work_delay() -> f64 {
    1.0
}
fn default_solitude_delay() -> f64 {
    10.0
}
fn default_dream_delay() -> f64 {
    5.0
}
fn default_speed_min() -> f64 {
    0.1
}
fn default_speed_max() -> f64 {
    10.0
}
fn default_emergency_threshold() -> u32 {
    5
}
fn default_stop_timeout() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            work_round_delay_secs: default_work_delay(),
            solitude_round_delay_secs: default_solitude_delay(),
            dream_round_delay_secs: default_dream_delay(),
            speed_multiplier_min: default_speed_min(),
            speed_multiplier_max: default_speed_max(),
            emergency_failure_threshold: default_emergency_threshold(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

/// Epistemic guardrail thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,

    #[serde(default = "default_coherence_threshold")]
    pub coherence_threshold: f64,
}

fn default_entropy_threshold() -> f64 {
    0.6
}
fn default_coherence_threshold() -> f64 {
    0.6
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: default_entropy_threshold(),
            coherence_threshold: default_coherence_threshold(),
        }
    }
}

/// Maintenance/lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub archive_dir: String,

    #[serde(default = "default_archive_hours")]
    pub archive_older_than_hours: i64,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

fn default_archive_hours() -> i64 {
    24
}
fn default_maintenance_interval() -> u64 {
    3600
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            archive_dir: "data_archive".to_string(),
            archive_older_than_hours: default_archive_hours(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

/// Adaptation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,

    #[serde(default = "default_pattern_scan_interval")]
    pub pattern_scan_interval_secs: u64,
}

fn default_variance_threshold() -> f64 {
    0.20
}
fn default_pattern_scan_interval() -> u64 {
    3600
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            variance_threshold: default_variance_threshold(),
            pattern_scan_interval_secs: default_pattern_scan_interval(),
        }
    }
}

impl CirisConfig {
    /// Merge another config into this one (other takes precedence).
    ///
    /// The loader handles priority: defaults -> user -> project.
    pub fn merge(&mut self, other: CirisConfig) {
        self.database = other.database;
        self.logging = other.logging;
        self.audit = other.audit;
        self.scheduler = other.scheduler;
        self.guardrail = other.guardrail;
        self.maintenance = other.maintenance;
        self.adaptation = other.adaptation;
    }

    /// Get the resolved database path.
    ///
    /// If the path is relative, it is resolved relative to `~/.ciris`.
    pub fn database_path(&self) -> std::path::PathBuf {
        let path = std::path::PathBuf::from(&self.database.path);
        if path.is_absolute() {
            path
        } else {
            dirs::home_dir()
                .expect("failed to resolve home directory")
                .join(".ciris")
                .join(path)
        }
    }
}
