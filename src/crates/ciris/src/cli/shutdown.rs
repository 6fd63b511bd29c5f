//! `ciris shutdown [--force] <reason>` - requests a graceful stop, or signs
//! and submits an emergency-shutdown command when `--force` is given. The
//! HMAC key is read from `CIRIS_EMERGENCY_KEY`; the CLI operator is the
//! trusted authority in this deployment.

use crate::audit::AuditEvent;
use crate::error::CirisError;
use crate::shutdown::EmergencyShutdownCommand;
use crate::{Result, RuntimeContext};

pub async fn run(context: &RuntimeContext, reason: &str, force: bool) -> Result<()> {
    if !force {
        context
            .audit()
            .append(AuditEvent::new(
                "shutdown_requested",
                "cli",
                serde_json::json!({ "reason": reason }),
            ))
            .await?;
        context.shutdown().request_shutdown();
        println!("graceful shutdown requested: {}", reason);
        return Ok(());
    }

    let key = std::env::var("CIRIS_EMERGENCY_KEY").map_err(|_| {
        CirisError::EmergencyStop("CIRIS_EMERGENCY_KEY is not set; cannot sign a forced shutdown".into())
    })?;
    let key = key.as_bytes();

    let command = EmergencyShutdownCommand::sign(reason, true, key)?;
    let timeout = command.verify(key);

    let accepted = timeout.is_ok();
    context
        .audit()
        .append(AuditEvent::new(
            "emergency_shutdown_attempt",
            "cli",
            serde_json::json!({ "reason": reason, "success": accepted }),
        ))
        .await?;

    let timeout = timeout?;

    context
        .audit()
        .append(AuditEvent::new(
            "emergency_shutdown_initiated",
            "cli",
            serde_json::json!({ "reason": reason, "timeout_secs": timeout.as_secs() }),
        ))
        .await?;

    context.shutdown().request_shutdown();
    println!(
        "emergency shutdown accepted: {} (forced stop within {}s)",
        reason,
        timeout.as_secs()
    );
    Ok(())
}
