//! Identity variance monitor: {LEARNING, REVIEWING, STABILIZING} states
//! gating adaptation on drift from a baseline identity snapshot.

use crate::error::{CirisError, Result};
use crate::models::{GraphNode, NodeScope, NodeType};
use crate::repositories::GraphRepository;
use crate::shutdown::EmergencyStopLatch;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationState {
    Learning,
    Reviewing,
    Stabilizing,
}

impl AdaptationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "LEARNING",
            Self::Reviewing => "REVIEWING",
            Self::Stabilizing => "STABILIZING",
        }
    }
}

/// An external wise-authority decision resolving a REVIEWING state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

pub struct IdentityVarianceMonitor {
    threshold: f64,
    state: RwLock<AdaptationState>,
    emergency_stop: EmergencyStopLatch,
    graph: Option<GraphRepository>,
}

impl IdentityVarianceMonitor {
    pub fn new(threshold: f64, emergency_stop: EmergencyStopLatch) -> Arc<Self> {
        Arc::new(Self {
            threshold,
            state: RwLock::new(AdaptationState::Learning),
            emergency_stop,
            graph: None,
        })
    }

    /// A monitor that persists a `wa_review` node whenever a breach enters
    /// REVIEWING, so the pending review survives a restart.
    pub fn with_graph(
        threshold: f64,
        emergency_stop: EmergencyStopLatch,
        graph: GraphRepository,
    ) -> Arc<Self> {
        Arc::new(Self {
            threshold,
            state: RwLock::new(AdaptationState::Learning),
            emergency_stop,
            graph: Some(graph),
        })
    }

    pub fn state(&self) -> AdaptationState {
        *self.state.read().expect("variance monitor poisoned")
    }

    /// Checks a computed variance scalar against the threshold. A breach
    /// moves the monitor to REVIEWING and surfaces a typed error; while
    /// REVIEWING every further observation is rejected until a
    /// wise-authority decision arrives via [`Self::resume_after_review`].
    pub async fn observe(&self, variance: f64) -> Result<()> {
        if self.emergency_stop.is_tripped() {
            warn!(variance, "emergency stop active, adaptation observation ignored");
            return Ok(());
        }

        let newly_breached = {
            let mut state = self.state.write().expect("variance monitor poisoned");
            if *state == AdaptationState::Reviewing {
                return Err(CirisError::Other(
                    "adaptation blocked pending wise-authority review".into(),
                ));
            }
            if variance > self.threshold {
                warn!(
                    variance,
                    threshold = self.threshold,
                    "identity variance exceeded, entering REVIEWING"
                );
                *state = AdaptationState::Reviewing;
                true
            } else {
                false
            }
        };

        if newly_breached {
            self.record_review(variance).await;
            return Err(CirisError::IdentityVarianceExceeded {
                variance,
                threshold: self.threshold,
            });
        }
        Ok(())
    }

    async fn record_review(&self, variance: f64) {
        let Some(graph) = &self.graph else {
            return;
        };
        let node = GraphNode::new(
            format!("wa_review_{}", Uuid::new_v4()),
            NodeType::Concept,
            NodeScope::Local,
            serde_json::json!({
                "insight_type": "wa_review",
                "variance": variance,
                "threshold": self.threshold,
                "requested_at": Utc::now().to_rfc3339(),
            }),
            "variance_monitor",
        );
        if let Err(e) = graph.upsert_node(&node).await {
            warn!(error = %e, "failed to record wa_review node");
        }
    }

    /// Resolves a REVIEWING state with an external wise-authority decision.
    /// A no-op outside REVIEWING.
    pub fn resume_after_review(&self, decision: ReviewDecision) {
        let mut state = self.state.write().expect("variance monitor poisoned");
        if *state != AdaptationState::Reviewing {
            return;
        }
        *state = match decision {
            ReviewDecision::Approve => AdaptationState::Stabilizing,
            ReviewDecision::Reject => AdaptationState::Learning,
        };
        info!(new_state = state.as_str(), "identity variance review resolved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn variance_within_threshold_stays_learning() {
        let monitor = IdentityVarianceMonitor::new(0.20, EmergencyStopLatch::new());
        monitor.observe(0.05).await.unwrap();
        assert_eq!(monitor.state(), AdaptationState::Learning);
    }

    #[tokio::test]
    async fn breach_enters_reviewing_and_blocks_further_adaptation() {
        let monitor = IdentityVarianceMonitor::new(0.20, EmergencyStopLatch::new());
        let result = monitor.observe(0.25).await;
        assert!(matches!(
            result,
            Err(CirisError::IdentityVarianceExceeded { .. })
        ));
        assert_eq!(monitor.state(), AdaptationState::Reviewing);

        // Even an in-threshold observation is rejected until review resolves.
        assert!(monitor.observe(0.01).await.is_err());
    }

    #[tokio::test]
    async fn approve_moves_to_stabilizing_reject_moves_to_learning() {
        let monitor = IdentityVarianceMonitor::new(0.20, EmergencyStopLatch::new());
        monitor.observe(0.25).await.unwrap_err();
        monitor.resume_after_review(ReviewDecision::Approve);
        assert_eq!(monitor.state(), AdaptationState::Stabilizing);

        monitor.observe(0.30).await.unwrap_err();
        monitor.resume_after_review(ReviewDecision::Reject);
        assert_eq!(monitor.state(), AdaptationState::Learning);
    }

    #[tokio::test]
    async fn breach_records_a_wa_review_node() {
        let db = Database::test_in_memory().await.unwrap();
        let graph = GraphRepository::new(std::sync::Arc::new(db));
        let monitor =
            IdentityVarianceMonitor::with_graph(0.20, EmergencyStopLatch::new(), graph.clone());

        monitor.observe(0.25).await.unwrap_err();

        let nodes = graph.search_nodes("wa_review", 10).await.unwrap();
        assert_eq!(nodes.len(), 1);
        let attrs = nodes[0].attributes().unwrap();
        assert_eq!(attrs["variance"], 0.25);
        assert_eq!(attrs["threshold"], 0.2);
    }

    #[tokio::test]
    async fn emergency_stop_suppresses_new_breaches() {
        let latch = EmergencyStopLatch::new();
        let monitor = IdentityVarianceMonitor::new(0.20, latch.clone());
        latch.trip();
        monitor.observe(0.9).await.unwrap();
        assert_eq!(monitor.state(), AdaptationState::Learning);
    }
}
