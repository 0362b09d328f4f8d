use bot_runtime::{InMemoryRuntime, ProcessRuntime, ProcessRuntimeConfig, RuntimeAdapter};
use domain::tasks::EventDispatcher;
use domain::{reconciliation, LifecycleContext, LifecycleSettings};
use events::{ChannelBus, EventPublisher};
use log::*;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use service::config::{Config, Orchestrator};
use service::logging::Logger;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!(
        "Starting up bot manager [{} environment, {} orchestrator]...",
        config.runtime_env(),
        config.orchestrator
    );

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            process::exit(1);
        }
    };

    if config.run_migrations {
        if let Err(e) = run_migrations(&db).await {
            error!("Failed to run database migrations: {e}");
            process::exit(1);
        }
    }

    let runtime = match build_runtime(&config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to initialize the bot runtime: {e}");
            process::exit(1);
        }
    };

    let bus = Arc::new(ChannelBus::new());
    let events = EventPublisher::new().with_handler(bus.clone());
    let lifecycle = LifecycleContext::new(
        Arc::clone(&db),
        runtime,
        events.clone(),
        Arc::new(EventDispatcher::new(events)),
        LifecycleSettings::from(&config),
    );

    let shutdown = CancellationToken::new();
    let reconciler = reconciliation::start(lifecycle.clone(), shutdown.clone());

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal: {e}");
            return;
        }
        info!("Shutdown signal received");
        ctrl_c.cancel();
    });

    let app_state = web::AppState::new(
        service::AppState::new(config, &db),
        lifecycle.clone(),
        bus,
    );

    if let Err(e) = web::init_server(app_state, shutdown.clone()).await {
        error!("Server stopped with an error: {e}");
        shutdown.cancel();
    }

    if let Err(e) = reconciler.await {
        warn!("Reconciliation loop ended abnormally: {e}");
    }

    // Scheduled stops are abandoned here; the next start's reconciliation sweep finalizes
    // whatever they would have.
    let pending = lifecycle.tasks.pending();
    if pending > 0 {
        info!("Abandoning {pending} scheduled lifecycle task(s)");
    }
    info!("Bot manager stopped");
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    info!("Running database migrations...");
    // The migration table lives on the search path, so the schema has to exist first.
    db.execute_unprepared(&format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        service::DB_SCHEMA
    ))
    .await?;
    Migrator::up(db, None).await
}

fn build_runtime(config: &Config) -> Result<Arc<dyn RuntimeAdapter>, bot_runtime::Error> {
    match config.orchestrator {
        Orchestrator::Process => {
            let runtime = ProcessRuntime::new(ProcessRuntimeConfig {
                command: config.bot_command.clone(),
                args: config.bot_args.clone(),
            })?;
            Ok(Arc::new(runtime))
        }
        Orchestrator::Memory => {
            warn!("Using the in-memory orchestrator; bots will not actually join meetings");
            Ok(Arc::new(InMemoryRuntime::new()))
        }
    }
}
