//! # ClawDBot — Marketplace Automation Service
//!
//! Scheduled jobs, AI assists, and a rate-limited HTTP gateway for the ClawD
//! property marketplace.
//!
//! Usage:
//!   clawdbot                                  # Start scheduler + gateway
//!   clawdbot serve --port 8080                # Custom gateway port
//!   clawdbot trigger property-cleanup --preview
//!   clawdbot status

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use clawdbot_core::auth::{Actor, Role};
use clawdbot_core::config::BotConfig;
use clawdbot_core::store::MemoryStore;
use clawdbot_gateway::AppState;
use clawdbot_scheduler::{
    BotCommand, JobRunner, OverlapGuard, SchedulerEngine, TriggerGate, TriggerRequest,
};
use clawdbot_services::{
    AuditDb, MemoryTransport, NotificationService, SuggestionService,
};

#[derive(Parser)]
#[command(name = "clawdbot", version, about = "🏠 ClawDBot — marketplace automation service")]
struct Cli {
    /// Config file path (overrides CLAWDBOT_CONFIG)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and the HTTP gateway (default)
    Serve {
        /// Override the configured gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one command now, as a local admin
    Trigger {
        /// Command name, e.g. property-cleanup
        command: String,
        /// Bypass the overlap guard and the maintenance window
        #[arg(long)]
        force: bool,
        /// Compute the plan without mutating anything
        #[arg(long)]
        preview: bool,
    },
    /// Print the current bot status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BotConfig::load_from(path)?,
        None => BotConfig::load()?,
    };

    let filter = if cli.verbose || config.debug.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Command::Trigger { command, force, preview } => {
            let runtime = Runtime::build(&config, true)?;
            let request = TriggerRequest {
                command,
                parameters: None,
                force,
                preview,
            };
            let actor = Actor { id: Uuid::new_v4(), role: Role::Admin };
            let outcome = runtime.trigger.trigger(&actor, &request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Status => {
            let runtime = Runtime::build(&config, true)?;
            let outcome = runtime.runner.run(BotCommand::Status, true).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.detail)?);
            Ok(())
        }
    }
}

/// Wired services shared by every entry point.
struct Runtime {
    runner: Arc<JobRunner>,
    trigger: Arc<TriggerGate>,
    suggestions: Arc<SuggestionService>,
    guard: OverlapGuard,
}

impl Runtime {
    /// `ephemeral` keeps the audit trail in memory (one-shot CLI commands).
    fn build(config: &BotConfig, ephemeral: bool) -> Result<Self> {
        let audit = Arc::new(if ephemeral {
            AuditDb::open_in_memory()?
        } else {
            AuditDb::open(&config.storage.audit_db_path())?
        });

        // The marketplace database adapter plugs in here; the in-memory
        // store keeps a standalone deployment functional.
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationService::new(
            config.notifications.clone(),
            Arc::new(MemoryTransport::default()),
        ));
        let call_timeout = std::time::Duration::from_secs(config.batch.timeout_secs);
        let suggestions = Arc::new(SuggestionService::from_config(&config.ai, call_timeout)?);

        let runner = Arc::new(JobRunner::new(
            config.clone(),
            store.clone(),
            store,
            audit,
            notifications,
            vec![],
        ));
        let guard = OverlapGuard::new();
        let trigger = Arc::new(TriggerGate::new(runner.clone(), guard.clone()));

        Ok(Self { runner, trigger, suggestions, guard })
    }
}

async fn serve(config: BotConfig) -> Result<()> {
    tracing::info!("clawdbot v{} starting", env!("CARGO_PKG_VERSION"));
    if !config.enabled {
        tracing::warn!("bot is disabled in config; gateway will refuse triggers");
    }

    let runtime = Runtime::build(&config, false)?;

    let engine = SchedulerEngine::new(runtime.runner.clone(), runtime.guard.clone());
    tokio::spawn(engine.run());

    let state = AppState::new(
        config,
        runtime.runner,
        runtime.trigger,
        runtime.suggestions,
    );
    clawdbot_gateway::start(state).await?;
    Ok(())
}
