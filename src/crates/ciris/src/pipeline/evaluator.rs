//! Evaluator chain: ethical -> common-sense -> domain (optional) -> action-selection.

use crate::error::{CirisError, Result};
use crate::models::{HandlerAction, Thought};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStage {
    Ethical,
    CommonSense,
    Domain,
    ActionSelection,
}

impl EvaluationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethical => "ethical",
            Self::CommonSense => "common_sense",
            Self::Domain => "domain",
            Self::ActionSelection => "action_selection",
        }
    }
}

/// Outcome of a single evaluator stage. `Continue` hands the thought to the
/// next stage unchanged; `SelectAction` short-circuits the chain. Only the
/// action-selection stage is expected to select in the common case, but an
/// earlier stage may veto a thought outright (e.g. rejecting it on ethical
/// grounds) by selecting early.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Continue,
    SelectAction(HandlerAction),
}

/// A single pluggable reasoning step. Implementations may call out to the
/// LLM bus for structured generation, a rules engine, or (in tests) a fixed
/// response table.
#[async_trait]
pub trait ThoughtEvaluator: Send + Sync {
    fn stage(&self) -> EvaluationStage;
    async fn evaluate(&self, thought: &Thought) -> Result<StageOutcome>;
}

/// Runs registered evaluators in a fixed order, stopping at the first
/// `SelectAction`. A missing domain evaluator is not an error: it is the
/// documented optional stage.
pub struct EvaluatorChain {
    stages: Vec<Arc<dyn ThoughtEvaluator>>,
    stage_timeout: Duration,
}

impl EvaluatorChain {
    pub fn new(stages: Vec<Arc<dyn ThoughtEvaluator>>) -> Self {
        Self {
            stages,
            stage_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    /// Returns the selected action, or `None` if every configured stage
    /// continued without selecting - callers treat that as a PONDER.
    pub async fn run(&self, thought: &Thought) -> Result<Option<HandlerAction>> {
        for stage in &self.stages {
            let label = stage.stage().as_str();
            let outcome = match timeout(self.stage_timeout, stage.evaluate(thought)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(stage = label, thought_id = %thought.thought_id, "evaluator stage timed out");
                    return Err(CirisError::Timeout {
                        operation: format!("evaluator stage {}", label),
                        duration_secs: self.stage_timeout.as_secs(),
                    });
                }
            };
            debug!(stage = label, thought_id = %thought.thought_id, "evaluator stage completed");
            if let StageOutcome::SelectAction(action) = outcome {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysContinue(EvaluationStage);

    #[async_trait]
    impl ThoughtEvaluator for AlwaysContinue {
        fn stage(&self) -> EvaluationStage {
            self.0
        }
        async fn evaluate(&self, _thought: &Thought) -> Result<StageOutcome> {
            Ok(StageOutcome::Continue)
        }
    }

    struct AlwaysSelect(HandlerAction);

    #[async_trait]
    impl ThoughtEvaluator for AlwaysSelect {
        fn stage(&self) -> EvaluationStage {
            EvaluationStage::ActionSelection
        }
        async fn evaluate(&self, _thought: &Thought) -> Result<StageOutcome> {
            Ok(StageOutcome::SelectAction(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn chain_short_circuits_on_first_selected_action() {
        let chain = EvaluatorChain::new(vec![
            Arc::new(AlwaysContinue(EvaluationStage::Ethical)),
            Arc::new(AlwaysSelect(HandlerAction::TaskComplete)),
            Arc::new(AlwaysContinue(EvaluationStage::ActionSelection)),
        ]);
        let thought = Thought::new("task-1", "x", "corr-1");
        let action = chain.run(&thought).await.unwrap();
        assert!(matches!(action, Some(HandlerAction::TaskComplete)));
    }

    #[tokio::test]
    async fn chain_with_no_selection_returns_none() {
        let chain = EvaluatorChain::new(vec![Arc::new(AlwaysContinue(EvaluationStage::Ethical))]);
        let thought = Thought::new("task-1", "x", "corr-1");
        assert!(chain.run(&thought).await.unwrap().is_none());
    }
}
