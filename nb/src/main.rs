//! Nudgebot daemon entry point

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use nudgebot::bot::{ChatService, SessionManager, spawn_session_sweeper};
use nudgebot::cli::{Cli, Command};
use nudgebot::config::Config;
use nudgebot::events::EventBus;
use nudgebot::parser::ParserService;
use nudgebot::repo::TaskService;
use nudgebot::scheduler::{ReminderScheduler, SchedulerError};
use nudgebot::transport::{BotApi, Messenger, cleanup_socket, create_listener_at, run_listener};
use taskstore::{SqliteStore, TaskStore};

/// Seconds between subscription health checks
const HEALTH_CHECK_SECS: u64 = 60;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{other}', defaulting to INFO");
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Some(Command::Config) => {
            print!("{}", serde_yaml::to_string(&config).context("Failed to render config")?);
            Ok(())
        }
        Some(Command::Run) | None => run_daemon(config).await,
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    config.validate()?;

    let store: Arc<dyn TaskStore> =
        Arc::new(SqliteStore::open(&config.storage.db_path).context("Failed to open task store")?);
    let bus = Arc::new(EventBus::asynchronous(
        config.bus.dispatch_workers,
        config.bus.queue_capacity,
    ));
    let sessions = Arc::new(SessionManager::new());
    let messenger: Arc<dyn Messenger> = Arc::new(BotApi::from_config(&config.chat)?);

    // service construction is fail-fast: a service that cannot establish
    // its subscriptions aborts startup
    let parser = ParserService::new(Arc::clone(&bus))
        .await
        .context("Failed to wire parser service")?;
    let tasks = TaskService::new(Arc::clone(&bus), Arc::clone(&store))
        .await
        .context("Failed to wire task service")?;
    let chat = ChatService::new(
        Arc::clone(&bus),
        Arc::clone(&store),
        messenger,
        Arc::clone(&sessions),
    )
    .await
    .context("Failed to wire chat service")?;

    let scheduler = Arc::new(ReminderScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&store),
        Arc::clone(&bus),
    ));
    scheduler.start().await?;

    let sweeper = spawn_session_sweeper(
        Arc::clone(&sessions),
        config.session.sweep_interval(),
        config.session.max_idle(),
    );

    // periodic operator-facing health signal
    let health = tokio::spawn({
        let parser = Arc::clone(&parser);
        let tasks = Arc::clone(&tasks);
        let chat = Arc::clone(&chat);
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(HEALTH_CHECK_SECS));
            loop {
                ticker.tick().await;
                for (name, result) in [
                    ("parser", parser.check_health()),
                    ("tasks", tasks.check_health()),
                    ("chat", chat.check_health()),
                ] {
                    if let Err(e) = result {
                        warn!(service = name, error = %e, "subscription health degraded");
                    }
                }
            }
        }
    });

    let (listener, socket_path) =
        create_listener_at(&config.chat.socket_path).context("Failed to bind webhook socket")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(run_listener(listener, Arc::clone(&chat), shutdown_rx));

    info!(socket = %socket_path.display(), "nudgebot running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("shutting down");

    let _ = shutdown_tx.send(true);
    match scheduler.stop().await {
        Ok(()) => {}
        Err(SchedulerError::StopTimeout { timeout_ms }) => {
            warn!(timeout_ms, "scheduler did not drain cleanly");
        }
        Err(e) => warn!(error = %e, "scheduler stop failed"),
    }
    bus.close();
    health.abort();
    sweeper.abort();
    let _ = tokio::time::timeout(Duration::from_secs(2), listener_task).await;
    cleanup_socket(&socket_path);

    info!("goodbye");
    Ok(())
}
