//! ServiceCorrelation: an immutable record of a bus-side-effect.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationType {
    ServiceInteraction,
    TraceSpan,
    MetricDatapoint,
    AuditEvent,
}

impl CorrelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceInteraction => "SERVICE_INTERACTION",
            Self::TraceSpan => "TRACE_SPAN",
            Self::MetricDatapoint => "METRIC_DATAPOINT",
            Self::AuditEvent => "AUDIT_EVENT",
        }
    }
}

impl std::fmt::Display for CorrelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable event row written alongside every bus-side-effect. Rows are
/// never deleted; they are superseded (not removed) by consolidation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceCorrelation {
    pub correlation_id: String,
    pub correlation_type: String,
    pub service_type: String,
    pub handler_name: String,
    pub action_type: String,
    pub request_data_json: String,
    pub response_data_json: Option<String>,
    pub timestamp: String,
    pub tags_json: String,
}

impl ServiceCorrelation {
    pub fn new(
        correlation_type: CorrelationType,
        service_type: impl Into<String>,
        handler_name: impl Into<String>,
        action_type: impl Into<String>,
        request_data: serde_json::Value,
        tags: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            correlation_type: correlation_type.as_str().to_string(),
            service_type: service_type.into(),
            handler_name: handler_name.into(),
            action_type: action_type.into(),
            request_data_json: request_data.to_string(),
            response_data_json: None,
            timestamp: Utc::now().to_rfc3339(),
            tags_json: tags.to_string(),
        }
    }

    pub fn with_response(mut self, response_data: serde_json::Value) -> Self {
        self.response_data_json = Some(response_data.to_string());
        self
    }
}
