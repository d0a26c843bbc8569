//! # DutyBell — reminder dispatcher for recurring obligations
//!
//! Evaluates open tasks against their reminder rules once a day and pushes
//! reminders to a Telegram channel.
//!
//! Usage:
//!   dutybell serve                # HTTP gateway (+ in-process schedule if configured)
//!   dutybell run                  # One scheduled run, result as JSON
//!   dutybell remind <task-id>     # Manually remind one task
//!   dutybell check                # Storage and channel health as JSON

use anyhow::Result;
use clap::{Parser, Subcommand};
use dutybell_channels::TelegramNotifier;
use dutybell_core::{DutyBellConfig, DutyBellError, Notifier, ObligationStore};
use dutybell_scheduler::{ReminderDb, ReminderEngine, RunStatus, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dutybell",
    version,
    about = "🔔 DutyBell — due-date reminders for institutional tasks"
)]
struct Cli {
    /// Config file (defaults to ~/.dutybell/config.toml)
    #[arg(short, long, env = "DUTYBELL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one scheduled reminder pass and print the result
    Run,
    /// Send a reminder for one task now
    Remind {
        /// Task id
        id: String,
    },
    /// Probe storage and the Telegram channel
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<DutyBellConfig> {
    let config = match path {
        Some(path) => {
            let mut config = DutyBellConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => DutyBellConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dutybell=debug,dutybell_scheduler=debug,dutybell_gateway=debug,dutybell_channels=debug,tower_http=debug"
    } else {
        "dutybell=info,dutybell_scheduler=info,dutybell_gateway=info,dutybell_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_ref())?;

    let db_path = config.database.resolved_path();
    let db = Arc::new(ReminderDb::open(&db_path)?);
    tracing::debug!("💾 Database: {}", db_path.display());

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(config.telegram.clone()));
    if !config.telegram.is_configured() {
        tracing::warn!("⚠️ Telegram credentials missing — every delivery will fail");
    }

    let engine = Arc::new(ReminderEngine::from_config(
        db.clone(),
        notifier.clone(),
        Arc::new(SystemClock),
        &config.reminders,
    ));

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            dutybell_gateway::start(&config, engine, db, notifier).await?;
        }
        Command::Run => match engine.run().await {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                if result.status == RunStatus::Failed {
                    std::process::exit(2);
                }
            }
            Err(e) => {
                eprintln!("❌ Reminder run failed: {e}");
                std::process::exit(1);
            }
        },
        Command::Remind { id } => match engine.remind_one(&id).await {
            Ok(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                if !outcome.success && !outcome.skipped {
                    std::process::exit(2);
                }
            }
            Err(DutyBellError::NotFound(_)) => {
                eprintln!("❌ Task not found: {id}");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Command::Check => {
            let database = match db.ping().await {
                Ok(()) => "connected".to_string(),
                Err(e) => {
                    tracing::error!("Database unreachable: {e}");
                    "failed".to_string()
                }
            };
            let telegram = notifier.probe().await;
            let healthy = database == "connected" && telegram == dutybell_core::ProbeStatus::Connected;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": if healthy { "healthy" } else { "degraded" },
                    "checks": { "database": database, "telegram": telegram.as_str() },
                }))?
            );
            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
