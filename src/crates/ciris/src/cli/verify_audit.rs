//! `ciris verify-audit` - re-derives the hash chain and signatures over the
//! whole audit log and prints the verification report.

use crate::audit::AuditVerifier;
use crate::repositories::AuditRepository;
use crate::{Result, RuntimeContext};

pub async fn run(context: &RuntimeContext) -> Result<()> {
    let verifier = AuditVerifier::new(AuditRepository::new(context.database_arc()));
    let report = verifier.verification_report().await?;

    println!("chain valid: {}", report.verification.valid);
    println!("entries verified: {}", report.verification.entries_verified);
    println!("hash chain valid: {}", report.verification.hash_chain_valid);
    println!("signatures valid: {}", report.verification.signatures_valid);
    println!("total entries: {}", report.total_entries);
    println!("signing key active: {}", report.signing_key_active);

    if let Some(seq) = report.first_tampered_sequence {
        println!("first tampered sequence: {}", seq);
    }
    for error in &report.verification.errors {
        println!("  error: {}", error);
    }
    for rec in &report.recommendations {
        println!("  recommendation: {}", rec);
    }

    if !report.verification.valid {
        std::process::exit(1);
    }
    Ok(())
}
