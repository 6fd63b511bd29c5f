//! # CIRIS - Autonomous Agent Core
//!
//! An autonomous agent runtime built around a cognitive state machine
//! (WAKEUP/WORK/PLAY/SOLITUDE/DREAM), a task/thought processing pipeline
//! gated by an epistemic guardrail, a typed service-bus layer for
//! cross-cutting capabilities (communication, memory, tools, wise
//! authority, LLM), a graph memory store with time-series consolidation,
//! and a signed, hash-chained audit log.
//!
//! ## Architecture
//!
//! The scheduler (`scheduler`) drives rounds through the cognitive states;
//! in WORK it hands pending thoughts to the pipeline (`pipeline`), which
//! runs an evaluator chain to select a `HandlerAction`, checks it against
//! the epistemic guardrail, and dispatches it through the appropriate
//! service bus (`bus`). Every dispatch is recorded as a correlation and an
//! audit entry. The adaptation loop (`adaptation`) watches behavioural
//! patterns and identity variance during SOLITUDE; the memory consolidator
//! (`memory`) folds raw activity into summary nodes during DREAM.

pub mod adaptation;
pub mod audit;
pub mod bus;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod events;
pub mod health;
pub mod maintenance;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod repositories;
pub mod scheduler;
pub mod shutdown;

mod error;

pub use error::{CirisError, Result};

pub use context::RuntimeContext;
pub use config::{load_config, CirisConfig, ConfigLoader};
pub use db::Database;
pub use events::{EventLogger, RuntimeEvent};
pub use health::{ComponentHealth, HealthChecker, HealthReport, HealthStatus};
pub use maintenance::{MaintenanceService, StartupCleanupReport};
pub use shutdown::{EmergencyShutdownCommand, EmergencyStopLatch, ShutdownCoordinator};

pub use models::{
    AuditEntry, CorrelationType, DeferralTicket, GraphEdge, GraphNode, HandlerAction, NodeScope,
    NodeType, ServiceCorrelation, SigningKey, Task, TaskStatus, Thought, ThoughtStatus,
};

pub use repositories::{
    AuditRepository, CorrelationRepository, DeferralRepository, GraphRepository, TaskRepository,
    ThoughtRepository,
};

pub use bus::{
    CommunicationBus, LlmBus, MemoryBus, ServiceHandle, ServiceRegistry, ServiceType, ToolBus,
    WiseAuthorityBus,
};

pub use audit::{AuditEvent, AuditService, AuditVerifier, KeyManager, VerificationReport};

pub use memory::{Consolidator, MemoryService};

pub use pipeline::{ActionDispatcher, EvaluatorChain, Guardrail, ThoughtProcessor};

pub use adaptation::{AdaptationState, IdentityVarianceMonitor, PatternAnalyzer, ReviewDecision};

pub use scheduler::{CognitiveState, Scheduler};

/// Crate version, forwarded from `Cargo.toml` for CLI `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
