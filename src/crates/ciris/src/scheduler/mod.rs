//! Cognitive scheduler: round loop driving the state machine and its
//! per-state processors.

mod processor;
mod state;

pub use processor::{
    DreamProcessor, PlayProcessor, ProcessorMetrics, ProcessorOutcome, SolitudeProcessor, StateProcessor,
    WakeupProcessor, WorkProcessor, WAKEUP_STEP_PREFIXES,
};
pub use state::{next_state, CognitiveState, TransitionRecommendation};

use crate::error::Result;
use crate::shutdown::{EmergencyStopLatch, ShutdownCoordinator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

/// Base per-round delay for each state, before the speed multiplier is applied.
fn base_delay(state: CognitiveState, work: Duration, solitude: Duration, dream: Duration) -> Duration {
    match state {
        CognitiveState::Work => work,
        CognitiveState::Solitude => solitude,
        CognitiveState::Dream => dream,
        CognitiveState::Play => work,
        CognitiveState::Wakeup => Duration::from_millis(100),
        CognitiveState::Shutdown => Duration::from_millis(0),
    }
}

/// Drives the cognitive state machine: advances `round_number`, invokes the
/// current state's processor once per round, applies its transition
/// recommendation, and sleeps for a state-dependent delay scaled by a live
/// speed multiplier. Responds to shutdown, pause/resume, and single-step.
///
/// A processor failure never escapes the loop: it is logged, counted, and
/// once the consecutive-failure count crosses the configured threshold the
/// emergency latch trips and the loop transitions to SHUTDOWN.
pub struct Scheduler {
    processors: HashMap<&'static str, Arc<dyn StateProcessor>>,
    state: RwLock<CognitiveState>,
    round_number: AtomicI64,
    paused: Arc<AtomicBool>,
    speed: watch::Sender<f64>,
    speed_rx: watch::Receiver<f64>,
    work_delay: Duration,
    solitude_delay: Duration,
    dream_delay: Duration,
    shutdown: ShutdownCoordinator,
    step_notify: Arc<tokio::sync::Notify>,
    consecutive_failures: AtomicU32,
    emergency_failure_threshold: u32,
    cleanup_timeout: Duration,
    emergency_stop: EmergencyStopLatch,
}

impl Scheduler {
    pub fn new(
        processors: HashMap<&'static str, Arc<dyn StateProcessor>>,
        shutdown: ShutdownCoordinator,
        work_delay: Duration,
        solitude_delay: Duration,
        dream_delay: Duration,
    ) -> Self {
        let (speed, speed_rx) = watch::channel(1.0);
        Self {
            processors,
            state: RwLock::new(CognitiveState::Shutdown),
            round_number: AtomicI64::new(0),
            paused: Arc::new(AtomicBool::new(false)),
            speed,
            speed_rx,
            work_delay,
            solitude_delay,
            dream_delay,
            shutdown,
            step_notify: Arc::new(tokio::sync::Notify::new()),
            consecutive_failures: AtomicU32::new(0),
            emergency_failure_threshold: 5,
            cleanup_timeout: Duration::from_secs(5),
            emergency_stop: EmergencyStopLatch::new(),
        }
    }

    pub fn with_failure_policy(mut self, threshold: u32, cleanup_timeout: Duration) -> Self {
        self.emergency_failure_threshold = threshold.max(1);
        self.cleanup_timeout = cleanup_timeout;
        self
    }

    pub fn with_emergency_latch(mut self, latch: EmergencyStopLatch) -> Self {
        self.emergency_stop = latch;
        self
    }

    pub async fn current_state(&self) -> CognitiveState {
        *self.state.read().await
    }

    pub fn round_number(&self) -> i64 {
        self.round_number.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wake a paused loop for exactly one round.
    pub fn step(&self) {
        self.step_notify.notify_one();
    }

    /// Clamped to the configured `[min, max]` bounds by the caller.
    pub fn set_speed_multiplier(&self, multiplier: f64) {
        let _ = self.speed.send(multiplier);
    }

    fn processor_for(&self, state: CognitiveState) -> Option<Arc<dyn StateProcessor>> {
        self.processors.get(state.as_str()).cloned()
    }

    /// Forces the state machine to `to`, bypassing processor
    /// recommendations. Transitions out of SHUTDOWN are rejected - only the
    /// run loop's own start sequence leaves SHUTDOWN. Returns the state that
    /// was replaced; the caller is responsible for auditing the override.
    pub async fn force_transition(&self, to: CognitiveState) -> Result<CognitiveState> {
        let mut state = self.state.write().await;
        if *state == CognitiveState::Shutdown && to != CognitiveState::Shutdown {
            return Err(crate::error::CirisError::Other(
                "cannot force a transition out of SHUTDOWN".into(),
            ));
        }
        let previous = *state;
        *state = to;
        warn!(from = previous.as_str(), to = to.as_str(), "forced state transition");
        Ok(previous)
    }

    /// Best-effort, time-bounded cleanup for the processor of the state the
    /// loop is leaving.
    async fn cleanup_state(&self, state: CognitiveState) {
        let Some(processor) = self.processor_for(state) else {
            return;
        };
        match tokio::time::timeout(self.cleanup_timeout, processor.cleanup()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(state = state.as_str(), error = %e, "processor cleanup failed"),
            Err(_) => warn!(
                state = state.as_str(),
                timeout_secs = self.cleanup_timeout.as_secs(),
                "processor cleanup timed out, abandoning"
            ),
        }
    }

    async fn initialize_state(&self, state: CognitiveState) -> bool {
        let Some(processor) = self.processor_for(state) else {
            return false;
        };
        match processor.initialize().await {
            Ok(()) => true,
            Err(e) => {
                error!(state = state.as_str(), error = %e, "processor initialization failed");
                false
            }
        }
    }

    /// One failure observed: log is the caller's job; returns `true` when
    /// the consecutive-failure budget is exhausted and the loop must stop.
    fn note_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.emergency_failure_threshold {
            if self.emergency_stop.trip() {
                error!(failures, "repeated processor failures tripped the emergency stop");
            }
            return true;
        }
        false
    }

    /// Starts the scheduler (SHUTDOWN -> WAKEUP) and runs rounds until a
    /// shutdown request is observed or a processor recommends SHUTDOWN.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = CognitiveState::Wakeup;
        }
        if !self.initialize_state(CognitiveState::Wakeup).await {
            *self.state.write().await = CognitiveState::Shutdown;
            return Ok(());
        }

        loop {
            if self.shutdown.is_shutdown_requested() || self.emergency_stop.is_tripped() {
                info!("shutdown requested, exiting round loop");
                break;
            }

            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = self.step_notify.notified() => {}
                    _ = self.shutdown.wait_for_shutdown() => break,
                }
            }

            let round_number = self.round_number.fetch_add(1, Ordering::SeqCst) + 1;
            let current = *self.state.read().await;
            if current == CognitiveState::Shutdown {
                break;
            }

            let processor = match self.processor_for(current) {
                Some(p) => p,
                None => {
                    warn!(state = current.as_str(), "no processor registered for state");
                    break;
                }
            };

            let next = match processor.process(round_number).await {
                Ok(outcome) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    if outcome.should_exit {
                        break;
                    }
                    match next_state(current, outcome.recommendation) {
                        Ok(next) => next,
                        Err(reason) => {
                            warn!(round_number, %reason, "processor recommended an illegal transition");
                            if self.note_failure() {
                                break;
                            }
                            current
                        }
                    }
                }
                Err(e) => {
                    warn!(round_number, state = current.as_str(), error = %e, "processor round failed");
                    if self.note_failure() {
                        break;
                    }
                    current
                }
            };

            if next != current {
                self.cleanup_state(current).await;
                if next != CognitiveState::Shutdown && !self.initialize_state(next).await && self.note_failure() {
                    break;
                }
            }

            *self.state.write().await = next;
            if next == CognitiveState::Shutdown {
                info!(round_number, "processor recommended shutdown");
                break;
            }

            // Higher multiplier means faster processing, so it divides the
            // base delay; clamped so a misconfigured caller can neither
            // freeze nor busy-spin the loop.
            let speed = self.speed_rx.borrow().clamp(0.1, 10.0);
            let delay = base_delay(next, self.work_delay, self.solitude_delay, self.dream_delay)
                .mul_f64(1.0 / speed);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.wait_for_shutdown() => break,
            }
        }

        let last = *self.state.read().await;
        if last != CognitiveState::Shutdown {
            self.cleanup_state(last).await;
        }
        *self.state.write().await = CognitiveState::Shutdown;
        Ok(())
    }
}
