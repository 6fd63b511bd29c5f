//! Error types for the CIRIS agent core.

use std::fmt;

/// Result type alias for CIRIS operations.
pub type Result<T> = std::result::Result<T, CirisError>;

/// Main error type for CIRIS operations.
#[derive(Debug)]
pub enum CirisError {
    /// Configuration error
    Config(String),

    /// Database error
    Database(String),

    /// Cryptographic error (signing, verification, key management)
    Crypto(String),

    /// An operation exceeded its allotted time budget
    Timeout { operation: String, duration_secs: u64 },

    /// No provider was registered for a required service/capability
    NoProviderAvailable { service: String },

    /// Outbound speech failed the entropy/coherence guardrail
    GuardrailBreach { entropy: f64, coherence: f64 },

    /// An evaluator's structured-generation response failed schema validation
    EvaluatorValidation(String),

    /// Identity drift exceeded the configured threshold
    IdentityVarianceExceeded { variance: f64, threshold: f64 },

    /// Emergency stop was triggered
    EmergencyStop(String),

    /// Requested entity not found
    NotFound(String),

    /// IO error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serde(serde_json::Error),

    /// SQL error
    Sqlx(sqlx::Error),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for CirisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Crypto(msg) => write!(f, "Cryptographic error: {}", msg),
            Self::Timeout { operation, duration_secs } => {
                write!(f, "{} timed out after {} seconds", operation, duration_secs)
            }
            Self::NoProviderAvailable { service } => {
                write!(f, "No provider available for service: {}", service)
            }
            Self::GuardrailBreach { entropy, coherence } => write!(
                f,
                "Guardrail breach: entropy={:.3} coherence={:.3}",
                entropy, coherence
            ),
            Self::EvaluatorValidation(msg) => write!(f, "Evaluator validation failed: {}", msg),
            Self::IdentityVarianceExceeded { variance, threshold } => write!(
                f,
                "Identity variance {:.3} exceeds threshold {:.3}",
                variance, threshold
            ),
            Self::EmergencyStop(msg) => write!(f, "Emergency stop: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serde(err) => write!(f, "Serialization error: {}", err),
            Self::Sqlx(err) => write!(f, "SQL error: {}", err),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CirisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CirisError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CirisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

impl From<sqlx::Error> for CirisError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

impl From<anyhow::Error> for CirisError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for CirisError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for CirisError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
