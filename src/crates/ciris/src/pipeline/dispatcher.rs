//! Action dispatcher: routes a selected [`HandlerAction`] to its owning bus,
//! applying the epistemic guardrail in front of SPEAK and recording a
//! correlation + audit entry for every dispatch.

use super::guardrail::{EpistemicScorer, Guardrail, GuardrailScore, GuardrailVerdict};
use crate::audit::{AuditEvent, AuditService};
use crate::bus::{CommunicationBus, MemoryBus, ToolBus, WiseAuthorityBus};
use crate::error::Result;
use crate::models::{CorrelationType, GraphNode, HandlerAction, NodeScope, NodeType, ServiceCorrelation, Thought};
use crate::repositories::CorrelationRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct ActionDispatcher {
    communication: Arc<CommunicationBus>,
    memory: Arc<MemoryBus>,
    tool: Arc<ToolBus>,
    wise_authority: Arc<WiseAuthorityBus>,
    scorer: Arc<dyn EpistemicScorer>,
    guardrail: Guardrail,
    correlations: CorrelationRepository,
    audit: Arc<AuditService>,
    max_ponder: i64,
}

impl ActionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        communication: Arc<CommunicationBus>,
        memory: Arc<MemoryBus>,
        tool: Arc<ToolBus>,
        wise_authority: Arc<WiseAuthorityBus>,
        scorer: Arc<dyn EpistemicScorer>,
        guardrail: Guardrail,
        correlations: CorrelationRepository,
        audit: Arc<AuditService>,
        max_ponder: i64,
    ) -> Self {
        Self {
            communication,
            memory,
            tool,
            wise_authority,
            scorer,
            guardrail,
            correlations,
            audit,
            max_ponder,
        }
    }

    fn route(action: &HandlerAction) -> (&'static str, &'static str) {
        match action {
            HandlerAction::Speak { .. } | HandlerAction::Observe { .. } => ("COMMUNICATION", "communication_bus"),
            HandlerAction::Memorize { .. } | HandlerAction::Recall { .. } | HandlerAction::Forget { .. } => {
                ("MEMORY", "memory_bus")
            }
            HandlerAction::Tool { .. } => ("TOOL", "tool_bus"),
            HandlerAction::Defer { .. } => ("WISE_AUTHORITY", "wise_authority_bus"),
            HandlerAction::Ponder { .. } | HandlerAction::Reject { .. } | HandlerAction::TaskComplete => {
                ("INTERNAL", "pipeline")
            }
        }
    }

    /// Every scored SPEAK leaves metric datapoints behind, pass or breach,
    /// so consolidation can aggregate the guardrail's behaviour over time.
    async fn record_scores(&self, thought: &Thought, score: GuardrailScore) -> Result<()> {
        for (metric, value) in [
            ("guardrail_entropy", score.entropy),
            ("guardrail_coherence", score.coherence),
        ] {
            let datapoint = ServiceCorrelation::new(
                CorrelationType::MetricDatapoint,
                "GUARDRAIL",
                metric,
                "epistemic_score",
                serde_json::json!({ "value": value }),
                serde_json::json!({ "thought_id": thought.thought_id }),
            );
            self.correlations.save(&datapoint).await?;
        }
        Ok(())
    }

    async fn apply_guardrail(
        &self,
        thought: &Thought,
        action: HandlerAction,
    ) -> Result<(HandlerAction, Option<GuardrailScore>)> {
        let content = match &action {
            HandlerAction::Speak { content, .. } => content.clone(),
            _ => return Ok((action, None)),
        };

        let score = self.scorer.score(&content).await?;
        self.record_scores(thought, score).await?;

        match self.guardrail.check(score) {
            GuardrailVerdict::Pass => Ok((action, Some(score))),
            GuardrailVerdict::Breach => {
                warn!(
                    thought_id = %thought.thought_id,
                    entropy = score.entropy,
                    coherence = score.coherence,
                    "guardrail breach, substituting action"
                );
                let span = ServiceCorrelation::new(
                    CorrelationType::TraceSpan,
                    "GUARDRAIL",
                    "guardrail",
                    "guardrail_breach",
                    serde_json::json!({
                        "violation_type": "content_filter",
                        "entropy": score.entropy,
                        "coherence": score.coherence,
                    }),
                    serde_json::json!({ "thought_id": thought.thought_id }),
                );
                self.correlations.save(&span).await?;
                self.audit
                    .append(AuditEvent::new(
                        "guardrail.breach",
                        thought.thought_id.clone(),
                        serde_json::json!({ "entropy": score.entropy, "coherence": score.coherence }),
                    ))
                    .await?;

                let substituted = if thought.ponder_count < self.max_ponder {
                    HandlerAction::Ponder {
                        questions: vec![
                            "the proposed response failed the epistemic guardrail; reconsider before speaking"
                                .to_string(),
                        ],
                    }
                } else {
                    HandlerAction::Defer {
                        reason: "epistemic guardrail breach exceeded the ponder limit".to_string(),
                        metadata: HashMap::new(),
                    }
                };
                Ok((substituted, Some(score)))
            }
        }
    }

    async fn execute(&self, thought: &Thought, action: &HandlerAction) -> Result<()> {
        match action {
            HandlerAction::Speak { channel_id, content } => {
                self.communication.send_message_sync(channel_id, content).await?;
                Ok(())
            }
            HandlerAction::Observe { channel_id, active } => {
                if *active {
                    self.communication.fetch_messages(channel_id, 1).await?;
                }
                Ok(())
            }
            HandlerAction::Memorize { node_id } => {
                let node = GraphNode::new(
                    node_id.clone(),
                    NodeType::Observation,
                    NodeScope::Local,
                    serde_json::json!({}),
                    "action_dispatcher",
                );
                self.memory.memorize(node).await?;
                Ok(())
            }
            HandlerAction::Recall { query } => {
                self.memory
                    .recall(crate::bus::MemoryQuery::by_prefix(query.clone(), 10))
                    .await?;
                Ok(())
            }
            HandlerAction::Forget { node_id, reason } => self.memory.forget(node_id, reason).await,
            HandlerAction::Tool { name, params } => {
                self.tool.execute(name, params.clone()).await?;
                Ok(())
            }
            HandlerAction::Defer { reason, .. } => {
                self.wise_authority.send_deferral(&thought.thought_id, reason).await?;
                Ok(())
            }
            HandlerAction::Ponder { .. } | HandlerAction::Reject { .. } | HandlerAction::TaskComplete => Ok(()),
        }
    }

    /// Dispatches `action` (possibly substituted by the guardrail), records
    /// the correlation and audit entry, and returns the action actually
    /// executed.
    pub async fn dispatch(&self, thought: &Thought, action: HandlerAction) -> Result<HandlerAction> {
        let (effective_action, score) = if action.requires_guardrail() {
            self.apply_guardrail(thought, action).await?
        } else {
            (action, None)
        };

        let (service_type, handler_name) = Self::route(&effective_action);
        let correlation = ServiceCorrelation::new(
            CorrelationType::ServiceInteraction,
            service_type,
            handler_name,
            effective_action.action_name(),
            serde_json::to_value(&effective_action)?,
            serde_json::json!({ "thought_id": thought.thought_id }),
        );
        self.correlations.save(&correlation).await?;

        let outcome = self.execute(thought, &effective_action).await;

        let mut payload = serde_json::json!({
            "action": effective_action,
            "correlation_id": correlation.correlation_id,
            "ok": outcome.is_ok(),
        });
        if let Some(score) = score {
            payload["guardrail"] = serde_json::json!({
                "entropy": score.entropy,
                "coherence": score.coherence,
            });
        }
        self.audit
            .append(AuditEvent::new(
                format!("handler.{}", effective_action.action_name()),
                thought.thought_id.clone(),
                payload,
            ))
            .await?;

        outcome?;
        Ok(effective_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::KeyManager;
    use crate::bus::{CommunicationProvider, ServiceHandle, ServiceRegistry, ServiceType};
    use crate::db::Database;
    use crate::pipeline::guardrail::GuardrailScore;
    use crate::repositories::AuditRepository;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedScorer(GuardrailScore);

    #[async_trait]
    impl EpistemicScorer for FixedScorer {
        async fn score(&self, _content: &str) -> Result<GuardrailScore> {
            Ok(self.0)
        }
    }

    struct RecordingCommunication;

    #[async_trait]
    impl CommunicationProvider for RecordingCommunication {
        async fn send_message(&self, _channel_id: &str, _content: &str) -> Result<bool> {
            Ok(true)
        }
        async fn fetch_messages(&self, _channel_id: &str, _limit: usize) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    async fn dispatcher(scorer: Arc<dyn EpistemicScorer>) -> (ActionDispatcher, CorrelationRepository, TempDir) {
        let db = Arc::new(Database::test_in_memory().await.unwrap());
        let registry = ServiceRegistry::new();
        registry.register(ServiceHandle::new("cli", ServiceType::Communication, vec!["send_message".into()]));
        let mut communication = CommunicationBus::new(registry.clone());
        communication.register_provider("cli", Arc::new(RecordingCommunication));

        let memory = MemoryBus::new(registry.clone());
        let tool = ToolBus::new(registry.clone());
        let wise_authority = WiseAuthorityBus::new(registry);

        let audit_repo = AuditRepository::new(db.clone());
        let dir = TempDir::new().unwrap();
        let keys = KeyManager::load_or_generate(dir.path(), &audit_repo).await.unwrap();
        let audit = AuditService::new(audit_repo, keys);
        let correlations = CorrelationRepository::new(db);

        let dispatcher = ActionDispatcher::new(
            Arc::new(communication),
            Arc::new(memory),
            Arc::new(tool),
            Arc::new(wise_authority),
            scorer,
            Guardrail::new(0.6, 0.6),
            correlations.clone(),
            audit,
            3,
        );
        (dispatcher, correlations, dir)
    }

    /// Every correlation of `correlation_type` currently stored, regardless
    /// of timestamp.
    async fn all_of_type(repo: &CorrelationRepository, correlation_type: &str) -> Vec<crate::models::ServiceCorrelation> {
        repo.list_by_type_in_window(correlation_type, "0", "9999")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn speak_within_thresholds_is_dispatched_unchanged() {
        let (dispatcher, _correlations, _dir) = dispatcher(Arc::new(FixedScorer(GuardrailScore {
            entropy: 0.1,
            coherence: 0.9,
        })))
        .await;
        let thought = Thought::new("task-1", "x", "corr-1");
        let action = HandlerAction::Speak {
            channel_id: "cli_local".into(),
            content: "hello".into(),
        };
        let dispatched = dispatcher.dispatch(&thought, action.clone()).await.unwrap();
        assert_eq!(dispatched, action);
    }

    #[tokio::test]
    async fn passing_speak_records_entropy_and_coherence_datapoints() {
        let (dispatcher, correlations, _dir) = dispatcher(Arc::new(FixedScorer(GuardrailScore {
            entropy: 0.2,
            coherence: 0.8,
        })))
        .await;
        let thought = Thought::new("task-1", "x", "corr-1");
        let action = HandlerAction::Speak {
            channel_id: "cli_local".into(),
            content: "hello".into(),
        };
        dispatcher.dispatch(&thought, action).await.unwrap();

        let datapoints = all_of_type(&correlations, "METRIC_DATAPOINT").await;
        assert_eq!(datapoints.len(), 2);
        let by_handler: std::collections::HashMap<_, _> = datapoints
            .iter()
            .map(|d| {
                let request: serde_json::Value = serde_json::from_str(&d.request_data_json).unwrap();
                (d.handler_name.clone(), request["value"].as_f64().unwrap())
            })
            .collect();
        assert_eq!(by_handler["guardrail_entropy"], 0.2);
        assert_eq!(by_handler["guardrail_coherence"], 0.8);

        // A pass produces no breach span.
        assert!(all_of_type(&correlations, "TRACE_SPAN").await.is_empty());
    }

    #[tokio::test]
    async fn speak_breaching_guardrail_is_substituted_with_ponder() {
        let (dispatcher, correlations, _dir) = dispatcher(Arc::new(FixedScorer(GuardrailScore {
            entropy: 0.95,
            coherence: 0.1,
        })))
        .await;
        let thought = Thought::new("task-1", "x", "corr-1");
        let action = HandlerAction::Speak {
            channel_id: "cli_local".into(),
            content: "hello".into(),
        };
        let dispatched = dispatcher.dispatch(&thought, action).await.unwrap();
        assert!(matches!(dispatched, HandlerAction::Ponder { .. }));

        // The breach leaves a trace span behind for trace consolidation.
        let spans = all_of_type(&correlations, "TRACE_SPAN").await;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].action_type, "guardrail_breach");
        let request: serde_json::Value = serde_json::from_str(&spans[0].request_data_json).unwrap();
        assert_eq!(request["violation_type"], "content_filter");
        assert_eq!(request["entropy"], 0.95);

        // Scores are recorded for the breached SPEAK too.
        assert_eq!(all_of_type(&correlations, "METRIC_DATAPOINT").await.len(), 2);
    }

    #[tokio::test]
    async fn breach_past_ponder_limit_degrades_to_defer() {
        let (dispatcher, _correlations, _dir) = dispatcher(Arc::new(FixedScorer(GuardrailScore {
            entropy: 0.95,
            coherence: 0.1,
        })))
        .await;
        let mut thought = Thought::new("task-1", "x", "corr-1");
        thought.ponder_count = 3;
        let action = HandlerAction::Speak {
            channel_id: "cli_local".into(),
            content: "hello".into(),
        };
        let dispatched = dispatcher.dispatch(&thought, action).await.unwrap();
        assert!(matches!(dispatched, HandlerAction::Defer { .. }));
    }

    #[tokio::test]
    async fn task_complete_is_dispatched_without_any_bus_call() {
        let (dispatcher, correlations, _dir) = dispatcher(Arc::new(FixedScorer(GuardrailScore {
            entropy: 0.0,
            coherence: 1.0,
        })))
        .await;
        let thought = Thought::new("task-1", "x", "corr-1");
        let dispatched = dispatcher.dispatch(&thought, HandlerAction::TaskComplete).await.unwrap();
        assert_eq!(dispatched, HandlerAction::TaskComplete);

        // Unscored actions leave no guardrail datapoints.
        assert!(all_of_type(&correlations, "METRIC_DATAPOINT").await.is_empty());
    }
}
