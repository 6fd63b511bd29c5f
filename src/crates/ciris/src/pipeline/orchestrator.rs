//! Ties the evaluator chain and action dispatcher into a single per-thought
//! processing step, including ponder-limit semantics.

use super::dispatcher::ActionDispatcher;
use super::evaluator::EvaluatorChain;
use crate::error::Result;
use crate::models::{HandlerAction, Thought, ThoughtStatus};
use crate::repositories::ThoughtRepository;

pub struct ThoughtProcessor {
    chain: EvaluatorChain,
    dispatcher: ActionDispatcher,
    thoughts: ThoughtRepository,
    max_ponder: i64,
}

impl ThoughtProcessor {
    pub fn new(
        chain: EvaluatorChain,
        dispatcher: ActionDispatcher,
        thoughts: ThoughtRepository,
        max_ponder: i64,
    ) -> Self {
        Self {
            chain,
            dispatcher,
            thoughts,
            max_ponder,
        }
    }

    /// Runs one full evaluation + dispatch cycle for `thought` and persists
    /// the resulting status. A thought that pondered past the limit is
    /// marked deferred rather than looped forever. An evaluator failure is
    /// a flagged fallback, not an error: the thought ponders the failure
    /// reason instead of crashing the round.
    pub async fn process(&self, mut thought: Thought, round_number: i64) -> Result<Thought> {
        thought.status = ThoughtStatus::Processing.as_str().to_string();
        self.thoughts.update(&thought).await?;

        let action = match self.chain.run(&thought).await {
            Ok(Some(action)) => action,
            Ok(None) => HandlerAction::Ponder {
                questions: vec!["no evaluator stage selected an action this round".to_string()],
            },
            Err(e) => {
                tracing::warn!(thought_id = %thought.thought_id, error = %e, "evaluator chain failed");
                HandlerAction::Ponder {
                    questions: vec![format!("evaluation failed and needs another attempt: {}", e)],
                }
            }
        };

        let dispatched = self.dispatcher.dispatch(&thought, action).await?;

        thought.round_processed = Some(round_number);
        thought.set_final_action(&dispatched)?;

        thought.status = match &dispatched {
            HandlerAction::Ponder { .. } => {
                thought.ponder_count += 1;
                if thought.ponder_count >= self.max_ponder {
                    ThoughtStatus::Deferred
                } else {
                    ThoughtStatus::Pending
                }
            }
            HandlerAction::Defer { .. } => ThoughtStatus::Deferred,
            HandlerAction::Reject { .. } => ThoughtStatus::Failed,
            _ => ThoughtStatus::Completed,
        }
        .as_str()
        .to_string();

        self.thoughts.update(&thought).await?;
        Ok(thought)
    }
}
