//! Behavioural pattern analysis: reads recent correlations and stores
//! detected patterns as CONCEPT nodes for the agent's own reasoning during DREAM.

use crate::error::Result;
use crate::models::{GraphNode, NodeScope, NodeType};
use crate::repositories::{CorrelationRepository, GraphRepository};
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Temporal,
    Frequency,
    Performance,
    Error,
    UserPreference,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temporal => "TEMPORAL",
            Self::Frequency => "FREQUENCY",
            Self::Performance => "PERFORMANCE",
            Self::Error => "ERROR",
            Self::UserPreference => "USER_PREFERENCE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectedPattern {
    pub kind: PatternKind,
    pub description: String,
    pub confidence: f64,
}

pub struct PatternAnalyzer {
    correlations: CorrelationRepository,
    graph: GraphRepository,
}

impl PatternAnalyzer {
    pub fn new(correlations: CorrelationRepository, graph: GraphRepository) -> Self {
        Self { correlations, graph }
    }

    /// Detects an ERROR pattern when a service type's error rate in the
    /// window exceeds `error_rate_threshold`, and a FREQUENCY pattern when
    /// a single handler accounts for more than half of all activity in the
    /// window. Both are cheap, explainable signals; richer detectors plug
    /// in behind the same `DetectedPattern` contract.
    pub async fn analyze_window(
        &self,
        start_rfc3339: &str,
        end_rfc3339: &str,
        error_rate_threshold: f64,
    ) -> Result<Vec<DetectedPattern>> {
        let correlations = self
            .correlations
            .list_by_type_in_window("SERVICE_INTERACTION", start_rfc3339, end_rfc3339)
            .await?;

        if correlations.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_handler: HashMap<String, usize> = HashMap::new();
        let mut error_count = 0usize;
        for c in &correlations {
            *by_handler.entry(c.handler_name.clone()).or_insert(0) += 1;
            if c.action_type == "reject" || c.response_data_json.as_deref() == Some("null") {
                error_count += 1;
            }
        }

        let total = correlations.len();
        let mut patterns = Vec::new();

        let error_rate = error_count as f64 / total as f64;
        if error_rate > error_rate_threshold {
            patterns.push(DetectedPattern {
                kind: PatternKind::Error,
                description: format!("error rate {:.2} exceeds threshold {:.2} in window", error_rate, error_rate_threshold),
                confidence: error_rate,
            });
        }

        if let Some((handler, count)) = by_handler.iter().max_by_key(|(_, n)| **n) {
            let share = *count as f64 / total as f64;
            if share > 0.5 {
                patterns.push(DetectedPattern {
                    kind: PatternKind::Frequency,
                    description: format!("handler {} accounts for {:.0}% of activity in window", handler, share * 100.0),
                    confidence: share,
                });
            }
        }

        for pattern in &patterns {
            self.store(pattern).await?;
        }
        info!(count = patterns.len(), "pattern analysis complete");
        Ok(patterns)
    }

    async fn store(&self, pattern: &DetectedPattern) -> Result<i64> {
        let node = GraphNode::new(
            format!("pattern_{}_{}", pattern.kind.as_str().to_lowercase(), Uuid::new_v4()),
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({
                "insight_type": "behavioral_pattern",
                "pattern_kind": pattern.kind.as_str(),
                "description": pattern.description,
                "confidence": pattern.confidence,
                "actionable": true,
                "detected_at": Utc::now().to_rfc3339(),
            }),
            "pattern_analyzer",
        );
        self.graph.upsert_node(&node).await
    }
}
