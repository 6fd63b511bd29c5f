//! CIRIS CLI - entrypoint for the autonomous agent runtime.
//!
//! Builds the runtime context once (config, database, service registry,
//! audit service, shutdown coordinator), then either dispatches a single
//! CLI subcommand or runs the cognitive scheduler loop.

use clap::{Parser, Subcommand};
use ciris::adaptation::{IdentityVarianceMonitor, PatternAnalyzer};
use ciris::bus::{
    CommunicationBus, LlmBus, MemoryBus, PersistedDeferralAuthority, ServiceHandle, ServiceType,
    ToolBus, WiseAuthorityBus,
};
use ciris::memory::{Consolidator, MemoryService};
use ciris::pipeline::{ActionDispatcher, EvaluatorChain, Guardrail, LlmEpistemicScorer, ThoughtProcessor};
use ciris::repositories::{
    AuditRepository, CorrelationRepository, DeferralRepository, GraphRepository, TaskRepository,
    ThoughtRepository,
};
use ciris::scheduler::{
    CognitiveState, DreamProcessor, PlayProcessor, SolitudeProcessor, StateProcessor,
    WakeupProcessor, WorkProcessor,
};
use ciris::shutdown::EmergencyStopLatch;
use ciris::{
    AuditService, CirisConfig, Database, KeyManager, MaintenanceService, RuntimeContext, Scheduler,
    ServiceRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A thought that keeps pondering past this many rounds is deferred instead.
const MAX_PONDER: i64 = 5;
/// Consecutive empty WORK rounds before the processor recommends DREAM.
const IDLE_ROUNDS_BEFORE_DREAM: u64 = 10;
/// Error share of a window's activity above which an ERROR pattern is stored.
const ERROR_RATE_THRESHOLD: f64 = 0.5;

#[derive(Parser)]
#[command(name = "ciris")]
#[command(about = "CIRIS - autonomous agent runtime", long_about = None)]
#[command(version = ciris::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,

    /// Check runtime health
    Health {
        /// Output format: text (default), json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store content as a CONCEPT node
    Memorize {
        content: String,
    },

    /// Search memorized nodes
    Recall {
        query: String,
    },

    /// Record a PONDER step with semicolon-separated questions
    Ponder {
        task_description: String,
        questions: String,
    },

    /// Speak on a channel through the communication bus
    Speak {
        channel: String,
        content: String,
    },

    /// Print task/thought counts and a health summary
    Status,

    /// Verify the signed audit chain
    VerifyAudit,

    /// Request a graceful or emergency shutdown
    Shutdown {
        reason: String,
        #[arg(long)]
        force: bool,
    },

    /// Run the cognitive scheduler loop
    Run,
}

async fn build_context(config: CirisConfig) -> anyhow::Result<RuntimeContext> {
    let db_path = config.database_path();
    let database = Arc::new(Database::initialize(&db_path).await?);

    let audit_repo = AuditRepository::new(database.clone());
    let keys = KeyManager::load_or_generate(&config.audit.key_dir, &audit_repo).await?;
    let audit = AuditService::new(audit_repo, keys);

    let registry = Arc::new(ServiceRegistry::new());
    let shutdown = ciris::ShutdownCoordinator::new();

    Ok(RuntimeContext::new(database, registry, audit, shutdown, config))
}

fn build_maintenance(context: &RuntimeContext) -> MaintenanceService {
    let db = context.database_arc();
    let tasks = TaskRepository::new(db.clone());
    let thoughts = ThoughtRepository::new(db.clone());
    let graph = GraphRepository::new(db.clone());
    let correlations = CorrelationRepository::new(db);
    let consolidator = Consolidator::new(correlations, tasks.clone(), graph.clone());
    let config = &context.config().maintenance;
    MaintenanceService::new(
        tasks,
        thoughts,
        graph,
        consolidator,
        config.archive_dir.clone(),
        config.archive_older_than_hours,
    )
}

/// Wires every per-state processor against the shared database and buses.
/// The evaluator chain starts empty: decision-making evaluators are external
/// capabilities registered by the embedding deployment, and with none
/// present the pipeline degrades each thought to PONDER, then DEFER.
fn build_scheduler(context: &RuntimeContext, emergency_stop: EmergencyStopLatch) -> Scheduler {
    let db = context.database_arc();
    let config = context.config();
    let registry = context.service_registry().clone();

    let tasks = TaskRepository::new(db.clone());
    let thoughts = ThoughtRepository::new(db.clone());
    let graph = GraphRepository::new(db.clone());
    let correlations = CorrelationRepository::new(db.clone());

    registry.register(ServiceHandle::new(
        "graph_store",
        ServiceType::Memory,
        vec!["memorize".into(), "recall".into(), "forget".into()],
    ));
    let mut memory_bus = MemoryBus::new(registry.clone());
    memory_bus.register_provider("graph_store", Arc::new(MemoryService::new(graph.clone())));

    registry.register(ServiceHandle::new(
        "deferral_store",
        ServiceType::WiseAuthority,
        vec!["defer".into()],
    ));
    let mut wise_authority = WiseAuthorityBus::new(registry.clone());
    wise_authority.register_provider(
        "deferral_store",
        Arc::new(PersistedDeferralAuthority::new(DeferralRepository::new(db))),
    );

    let communication = Arc::new(CommunicationBus::new(registry.clone()));
    let tool = Arc::new(ToolBus::new(registry.clone()));
    let llm = Arc::new(LlmBus::new(registry));

    let dispatcher = ActionDispatcher::new(
        communication,
        Arc::new(memory_bus),
        tool,
        Arc::new(wise_authority),
        Arc::new(LlmEpistemicScorer::new(llm)),
        Guardrail::new(
            config.guardrail.entropy_threshold,
            config.guardrail.coherence_threshold,
        ),
        correlations.clone(),
        context.audit_arc(),
        MAX_PONDER,
    );
    let thought_processor = ThoughtProcessor::new(
        EvaluatorChain::new(Vec::new()),
        dispatcher,
        thoughts.clone(),
        MAX_PONDER,
    );

    let variance = IdentityVarianceMonitor::with_graph(
        config.adaptation.variance_threshold,
        emergency_stop.clone(),
        graph.clone(),
    );
    let patterns = PatternAnalyzer::new(correlations.clone(), graph.clone());
    let consolidator = Consolidator::new(correlations, tasks.clone(), graph);

    let mut processors: HashMap<&'static str, Arc<dyn StateProcessor>> = HashMap::new();
    processors.insert(
        CognitiveState::Wakeup.as_str(),
        Arc::new(WakeupProcessor::new(tasks)),
    );
    processors.insert(
        CognitiveState::Work.as_str(),
        Arc::new(WorkProcessor::new(
            thoughts,
            thought_processor,
            IDLE_ROUNDS_BEFORE_DREAM,
        )),
    );
    processors.insert(CognitiveState::Play.as_str(), Arc::new(PlayProcessor::new()));
    processors.insert(
        CognitiveState::Solitude.as_str(),
        Arc::new(SolitudeProcessor::new(patterns, variance, ERROR_RATE_THRESHOLD)),
    );
    processors.insert(
        CognitiveState::Dream.as_str(),
        Arc::new(DreamProcessor::new(consolidator)),
    );

    Scheduler::new(
        processors,
        context.shutdown().clone(),
        Duration::from_secs_f64(config.scheduler.work_round_delay_secs),
        Duration::from_secs_f64(config.scheduler.solitude_round_delay_secs),
        Duration::from_secs_f64(config.scheduler.dream_round_delay_secs),
    )
    .with_failure_policy(
        config.scheduler.emergency_failure_threshold,
        Duration::from_secs(config.scheduler.stop_timeout_secs),
    )
    .with_emergency_latch(emergency_stop)
}

async fn run_agent(context: &RuntimeContext) -> anyhow::Result<()> {
    let maintenance = build_maintenance(context);
    let report = maintenance.perform_startup_cleanup().await?;
    tracing::info!(?report, "startup cleanup complete");

    let interval = Duration::from_secs(context.config().maintenance.maintenance_interval_secs);
    let shutdown = context.shutdown().clone();
    let periodic = {
        let maintenance = build_maintenance(context);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => maintenance.run_scheduled_maintenance().await,
                    _ = shutdown.wait_for_shutdown() => break,
                }
            }
        })
    };

    let scheduler = build_scheduler(context, EmergencyStopLatch::new());
    scheduler.run().await?;

    periodic.abort();
    maintenance.final_cleanup().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ciris::load_config().await?;
    let context = build_context(config).await?;
    let _signal_handler = context.shutdown().install_signal_handlers();

    match cli.command {
        None | Some(Commands::Version) => {
            println!("ciris {}", ciris::VERSION);
        }
        Some(Commands::Health { format }) => {
            let report = ciris::HealthChecker::check_context(&context).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("health: {}", report.status);
                for check in &report.checks {
                    println!("  {:<16} {:<10} {}", check.name, check.status, check.message.clone().unwrap_or_default());
                }
            }
        }
        Some(Commands::Memorize { content }) => {
            ciris::cli::memorize::run(&context, &content).await?;
        }
        Some(Commands::Recall { query }) => {
            ciris::cli::recall::run(&context, &query).await?;
        }
        Some(Commands::Ponder { task_description, questions }) => {
            ciris::cli::ponder::run(&context, &task_description, &questions).await?;
        }
        Some(Commands::Speak { channel, content }) => {
            ciris::cli::speak::run(&context, &channel, &content).await?;
        }
        Some(Commands::Status) => {
            ciris::cli::status::run(&context).await?;
        }
        Some(Commands::VerifyAudit) => {
            ciris::cli::verify_audit::run(&context).await?;
        }
        Some(Commands::Shutdown { reason, force }) => {
            ciris::cli::shutdown::run(&context, &reason, force).await?;
        }
        Some(Commands::Run) => {
            run_agent(&context).await?;
        }
    }

    context.database().close().await;
    Ok(())
}
