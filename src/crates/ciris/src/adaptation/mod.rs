//! Adaptation loop: behavioural pattern analysis and identity variance monitoring.

mod pattern;
mod variance;

pub use pattern::{DetectedPattern, PatternAnalyzer, PatternKind};
pub use variance::{AdaptationState, IdentityVarianceMonitor, ReviewDecision};
