//! DeferralTicket: a persisted escalation awaiting a wise-authority decision.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One DEFER action escalated to the wise authority. Open tickets have
/// `resolved_at == None`; resolution text records the authority's answer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeferralTicket {
    pub deferral_id: String,
    pub thought_id: String,
    pub reason: String,
    pub metadata_json: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub resolution: Option<String>,
}

impl DeferralTicket {
    pub fn new(thought_id: impl Into<String>, reason: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            deferral_id: Uuid::new_v4().to_string(),
            thought_id: thought_id.into(),
            reason: reason.into(),
            metadata_json: metadata.to_string(),
            created_at: Utc::now().to_rfc3339(),
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ticket_is_open() {
        let ticket = DeferralTicket::new("thought-1", "needs human judgement", serde_json::json!({}));
        assert!(ticket.is_open());
        assert_eq!(ticket.reason, "needs human judgement");
    }
}
