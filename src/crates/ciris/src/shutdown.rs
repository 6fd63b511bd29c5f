//! Shutdown coordination: graceful stop-event plumbing plus signed
//! emergency-shutdown command verification.

use crate::error::{CirisError, Result};
use chrono::Utc;
use hex;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Coordinates a graceful stop: any task can request shutdown, every waiter
/// observes it exactly once (idempotent via the `swap`), and late askers
/// get an immediate answer from `is_shutdown_requested` rather than hanging.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.shutdown_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            self.shutdown_notify.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_notify.notified().await;
    }

    /// Spawns a background task that requests shutdown on SIGINT/SIGTERM
    /// (unix) or Ctrl+C (elsewhere).
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
                let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

                tokio::select! {
                    _ = sigint.recv() => {
                        warn!("received SIGINT, initiating graceful shutdown");
                        coordinator.request_shutdown();
                    }
                    _ = sigterm.recv() => {
                        warn!("received SIGTERM, initiating graceful shutdown");
                        coordinator.request_shutdown();
                    }
                }
            }

            #[cfg(not(unix))]
            {
                use tokio::signal;

                signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
                warn!("received Ctrl+C, initiating graceful shutdown");
                coordinator.request_shutdown();
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// A signed request to skip graceful draining and stop immediately.
/// `signature` is hex-encoded HMAC-SHA256 over `reason|timestamp|force`
/// keyed by the shared emergency key; timestamps outside a five-minute
/// window are rejected to bound replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyShutdownCommand {
    pub reason: String,
    pub timestamp: String,
    pub force: bool,
    pub signature: String,
}

const REPLAY_WINDOW_SECS: i64 = 300;

impl EmergencyShutdownCommand {
    pub fn sign(reason: impl Into<String>, force: bool, key: &[u8]) -> Result<Self> {
        let reason = reason.into();
        let timestamp = Utc::now().to_rfc3339();
        let signature = compute_signature(&reason, &timestamp, force, key)?;
        Ok(Self {
            reason,
            timestamp,
            force,
            signature,
        })
    }

    /// Verifies the signature and replay window. Returns the timeout to
    /// honor before a hard kill: 5s when `force`, 30s otherwise.
    pub fn verify(&self, key: &[u8]) -> Result<std::time::Duration> {
        let provided = hex::decode(&self.signature)
            .map_err(|e| CirisError::Crypto(format!("malformed emergency shutdown signature: {}", e)))?;
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| CirisError::Crypto(format!("invalid emergency shutdown key: {}", e)))?;
        mac.update(signing_payload(&self.reason, &self.timestamp, self.force).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| CirisError::Crypto("emergency shutdown signature mismatch".into()))?;

        let issued = chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| CirisError::Crypto(format!("malformed emergency shutdown timestamp: {}", e)))?;
        let drift = (Utc::now() - issued.with_timezone(&Utc)).num_seconds().abs();
        if drift > REPLAY_WINDOW_SECS {
            return Err(CirisError::EmergencyStop(format!(
                "emergency shutdown command timestamp outside replay window ({}s drift)",
                drift
            )));
        }

        Ok(if self.force {
            std::time::Duration::from_secs(5)
        } else {
            std::time::Duration::from_secs(30)
        })
    }
}

fn signing_payload(reason: &str, timestamp: &str, force: bool) -> String {
    format!("{}|{}|{}", reason, timestamp, force)
}

fn compute_signature(reason: &str, timestamp: &str, force: bool, key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CirisError::Crypto(format!("invalid emergency shutdown key: {}", e)))?;
    mac.update(signing_payload(reason, timestamp, force).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Idempotent latch tripped on repeated catastrophic failure. Once tripped
/// it stays tripped for the life of the process; callers use it to gate
/// adaptation and force the scheduler to SHUTDOWN.
#[derive(Clone, Default)]
pub struct EmergencyStopLatch {
    tripped: Arc<AtomicBool>,
}

impl EmergencyStopLatch {
    pub fn new() -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` the first time the latch trips, `false` on repeat calls.
    pub fn trip(&self) -> bool {
        !self.tripped.swap(true, Ordering::SeqCst)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}
