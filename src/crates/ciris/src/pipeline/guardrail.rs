//! Epistemic guardrail: entropy/coherence gate in front of SPEAK dispatch.

use crate::bus::LlmBus;
use crate::error::{CirisError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardrailScore {
    pub entropy: f64,
    pub coherence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailVerdict {
    Pass,
    Breach,
}

/// Scores proposed SPEAK content for entropy (how surprising the content is
/// relative to the conversation) and coherence (how well it tracks it). A
/// real implementation calls out through the LLM bus; tests substitute a
/// fixed scorer.
#[async_trait]
pub trait EpistemicScorer: Send + Sync {
    async fn score(&self, content: &str) -> Result<GuardrailScore>;
}

#[derive(Debug, Clone, Copy)]
pub struct Guardrail {
    pub entropy_threshold: f64,
    pub coherence_threshold: f64,
}

impl Guardrail {
    pub fn new(entropy_threshold: f64, coherence_threshold: f64) -> Self {
        Self {
            entropy_threshold,
            coherence_threshold,
        }
    }

    /// A breach is entropy above threshold (too surprising, low confidence)
    /// or coherence below threshold (doesn't track the conversation).
    pub fn check(&self, score: GuardrailScore) -> GuardrailVerdict {
        if score.entropy > self.entropy_threshold || score.coherence < self.coherence_threshold {
            GuardrailVerdict::Breach
        } else {
            GuardrailVerdict::Pass
        }
    }
}

/// Scores SPEAK content by asking the LLM bus for a structured
/// `{entropy, coherence}` object. The bus itself raises `NoProviderAvailable`
/// when no LLM provider is registered, which the dispatcher's guardrail path
/// treats the same as any other scoring failure.
pub struct LlmEpistemicScorer {
    llm: Arc<LlmBus>,
}

impl LlmEpistemicScorer {
    pub fn new(llm: Arc<LlmBus>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl EpistemicScorer for LlmEpistemicScorer {
    async fn score(&self, content: &str) -> Result<GuardrailScore> {
        let prompt = format!(
            "Score the following message for entropy (0=ordered, 1=chaotic) and \
             coherence (0=off-voice, 1=on-voice): {}",
            content
        );
        let value = self
            .llm
            .structured_generate(&prompt, "{\"entropy\": f64, \"coherence\": f64}")
            .await?;

        let entropy = value.get("entropy").and_then(|v| v.as_f64()).ok_or_else(|| {
            CirisError::EvaluatorValidation("guardrail scorer response missing entropy".into())
        })?;
        let coherence = value.get("coherence").and_then(|v| v.as_f64()).ok_or_else(|| {
            CirisError::EvaluatorValidation("guardrail scorer response missing coherence".into())
        })?;

        Ok(GuardrailScore { entropy, coherence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_entropy_is_a_breach() {
        let guardrail = Guardrail::new(0.6, 0.6);
        let verdict = guardrail.check(GuardrailScore {
            entropy: 0.9,
            coherence: 0.8,
        });
        assert_eq!(verdict, GuardrailVerdict::Breach);
    }

    #[test]
    fn low_coherence_is_a_breach() {
        let guardrail = Guardrail::new(0.6, 0.6);
        let verdict = guardrail.check(GuardrailScore {
            entropy: 0.2,
            coherence: 0.4,
        });
        assert_eq!(verdict, GuardrailVerdict::Breach);
    }

    #[test]
    fn within_thresholds_passes() {
        let guardrail = Guardrail::new(0.6, 0.6);
        let verdict = guardrail.check(GuardrailScore {
            entropy: 0.3,
            coherence: 0.8,
        });
        assert_eq!(verdict, GuardrailVerdict::Pass);
    }
}
