//! Per-state processor contract and the five concrete processors.

use super::state::TransitionRecommendation;
use crate::adaptation::{IdentityVarianceMonitor, PatternAnalyzer};
use crate::error::Result;
use crate::memory::Consolidator;
use crate::models::{Task, TaskStatus};
use crate::pipeline::ThoughtProcessor;
use crate::repositories::TaskRepository;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// The six named identity-affirmation root tasks run, in order, during WAKEUP.
pub const WAKEUP_STEP_PREFIXES: [&str; 6] = [
    "WAKEUP_",
    "VERIFY_IDENTITY_",
    "VALIDATE_INTEGRITY_",
    "EVALUATE_RESILIENCE_",
    "ACCEPT_INCOMPLETENESS_",
    "EXPRESS_GRATITUDE_",
];

#[derive(Debug, Clone, Default)]
pub struct ProcessorMetrics {
    pub rounds_processed: u64,
    pub last_round_number: i64,
}

#[derive(Debug, Clone)]
pub struct ProcessorOutcome {
    pub recommendation: TransitionRecommendation,
    pub should_exit: bool,
}

impl ProcessorOutcome {
    pub fn stay() -> Self {
        Self {
            recommendation: TransitionRecommendation::None,
            should_exit: false,
        }
    }

    pub fn recommend(recommendation: TransitionRecommendation) -> Self {
        Self {
            recommendation,
            should_exit: false,
        }
    }
}

#[async_trait]
pub trait StateProcessor: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn process(&self, round_number: i64) -> Result<ProcessorOutcome>;
    async fn cleanup(&self) -> Result<()>;
    fn metrics(&self) -> ProcessorMetrics;
}

/// Runs the six identity-affirmation root tasks once, in order; recommends
/// WORK once all are complete, SHUTDOWN if any fails to be created.
pub struct WakeupProcessor {
    tasks: TaskRepository,
    rounds: AtomicU64,
}

impl WakeupProcessor {
    pub fn new(tasks: TaskRepository) -> Self {
        Self {
            tasks,
            rounds: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl StateProcessor for WakeupProcessor {
    async fn initialize(&self) -> Result<()> {
        let now = Utc::now();
        for prefix in WAKEUP_STEP_PREFIXES {
            let task = Task::with_parent(
                format!("{} affirmation", prefix.trim_end_matches('_').to_lowercase()),
                "system",
                None,
                now,
            );
            let mut task = task;
            task.task_id = format!("{}{}", prefix, task.task_id);
            self.tasks.save(&task).await?;
        }
        Ok(())
    }

    async fn process(&self, round_number: i64) -> Result<ProcessorOutcome> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let active = self.tasks.list_by_status(TaskStatus::Active.as_str()).await?;
        let wakeup_steps_pending = active
            .iter()
            .any(|t| WAKEUP_STEP_PREFIXES.iter().any(|p| t.task_id.starts_with(p)));

        if wakeup_steps_pending {
            for task in &active {
                if WAKEUP_STEP_PREFIXES.iter().any(|p| task.task_id.starts_with(p)) {
                    self.tasks.update_status(&task.task_id, TaskStatus::Completed.as_str()).await?;
                }
            }
            info!(round_number, "wakeup affirmations completed");
        }

        Ok(ProcessorOutcome::recommend(TransitionRecommendation::ToWork))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            rounds_processed: self.rounds.load(Ordering::SeqCst),
            last_round_number: 0,
        }
    }
}

/// Pulls pending thoughts and dispatches them through the pipeline.
/// Recommends DREAM after enough consecutive idle rounds (no pending work).
pub struct WorkProcessor {
    thoughts: crate::repositories::ThoughtRepository,
    processor: ThoughtProcessor,
    idle_rounds: AtomicU64,
    idle_rounds_before_dream: u64,
    rounds: AtomicU64,
}

impl WorkProcessor {
    pub fn new(
        thoughts: crate::repositories::ThoughtRepository,
        processor: ThoughtProcessor,
        idle_rounds_before_dream: u64,
    ) -> Self {
        Self {
            thoughts,
            processor,
            idle_rounds: AtomicU64::new(0),
            idle_rounds_before_dream,
            rounds: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl StateProcessor for WorkProcessor {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn process(&self, round_number: i64) -> Result<ProcessorOutcome> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let pending = self.thoughts.list_by_status("pending").await?;

        if pending.is_empty() {
            let idle = self.idle_rounds.fetch_add(1, Ordering::SeqCst) + 1;
            if idle >= self.idle_rounds_before_dream {
                self.idle_rounds.store(0, Ordering::SeqCst);
                return Ok(ProcessorOutcome::recommend(TransitionRecommendation::ToDream));
            }
            return Ok(ProcessorOutcome::stay());
        }

        self.idle_rounds.store(0, Ordering::SeqCst);
        for thought in pending {
            if let Err(e) = self.processor.process(thought, round_number).await {
                warn!(error = %e, round_number, "thought processing failed");
            }
        }
        Ok(ProcessorOutcome::stay())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            rounds_processed: self.rounds.load(Ordering::SeqCst),
            last_round_number: 0,
        }
    }
}

/// Exploratory state; no live exploratory action set is wired up yet, so a
/// round in PLAY simply returns to WORK.
pub struct PlayProcessor {
    rounds: AtomicU64,
}

impl PlayProcessor {
    pub fn new() -> Self {
        Self {
            rounds: AtomicU64::new(0),
        }
    }
}

impl Default for PlayProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateProcessor for PlayProcessor {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn process(&self, _round_number: i64) -> Result<ProcessorOutcome> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessorOutcome::recommend(TransitionRecommendation::ToWork))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            rounds_processed: self.rounds.load(Ordering::SeqCst),
            last_round_number: 0,
        }
    }
}

/// Runs adaptation (pattern analysis + identity variance) at a slow pace.
pub struct SolitudeProcessor {
    patterns: PatternAnalyzer,
    variance: Arc<IdentityVarianceMonitor>,
    error_rate_threshold: f64,
    rounds: AtomicU64,
}

impl SolitudeProcessor {
    pub fn new(patterns: PatternAnalyzer, variance: Arc<IdentityVarianceMonitor>, error_rate_threshold: f64) -> Self {
        Self {
            patterns,
            variance,
            error_rate_threshold,
            rounds: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl StateProcessor for SolitudeProcessor {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn process(&self, _round_number: i64) -> Result<ProcessorOutcome> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let window_start = (now - chrono::Duration::hours(1)).to_rfc3339();
        let window_end = now.to_rfc3339();
        let found = self
            .patterns
            .analyze_window(&window_start, &window_end, self.error_rate_threshold)
            .await?;

        // A high observed error rate is treated as a coarse proxy for
        // identity drift until a dedicated baseline-comparison metric
        // exists; any detected ERROR pattern feeds the variance monitor.
        if let Some(error_pattern) = found.iter().find(|p| p.kind == crate::adaptation::PatternKind::Error) {
            let _ = self.variance.observe(error_pattern.confidence).await;
        }

        Ok(ProcessorOutcome::recommend(TransitionRecommendation::ToWork))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            rounds_processed: self.rounds.load(Ordering::SeqCst),
            last_round_number: 0,
        }
    }
}

/// Runs for a single bounded round performing consolidation, then returns to WORK.
pub struct DreamProcessor {
    consolidator: Consolidator,
    rounds: AtomicU64,
}

impl DreamProcessor {
    pub fn new(consolidator: Consolidator) -> Self {
        Self {
            consolidator,
            rounds: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl StateProcessor for DreamProcessor {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn process(&self, _round_number: i64) -> Result<ProcessorOutcome> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let (window_start, window_end, label) = crate::memory::six_hour_window(Utc::now());
        let created = self.consolidator.consolidate_basic(&window_start, &window_end, &label).await?;
        info!(created = created.len(), "dream consolidation pass complete");
        Ok(ProcessorOutcome::recommend(TransitionRecommendation::ToWork))
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn metrics(&self) -> ProcessorMetrics {
        ProcessorMetrics {
            rounds_processed: self.rounds.load(Ordering::SeqCst),
            last_round_number: 0,
        }
    }
}
