//! # Legal Alerts Server Main Driver
//!
//! ## Purpose
//! Main entry point for the alert engine. Constructs every component
//! explicitly — store, index client, percolator registry, percolation
//! engine, dispatcher — and starts the web server, or runs a one-shot
//! digest pass.
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open the alert store and build the index client
//! 4. Wire registry, percolation engine and dispatcher
//! 5. Start the API server (or run the requested digest rate and exit)
//! 6. Handle shutdown signals gracefully

use clap::{Arg, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use legal_alerts::{
    api::ApiServer,
    config::Config,
    digest::DigestRunner,
    dispatch::AlertDispatcher,
    errors::{Result, SearchError},
    index::HttpIndexClient,
    notify::HttpNotifier,
    percolator::{PercolationEngine, PercolatorRegistry},
    store::AlertStore,
    AppState, Rate,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("legal-alerts-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Legal Search Team")
        .about("Search-alert percolation engine for legal research platforms")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("send-digests")
                .long("send-digests")
                .value_name("RATE")
                .help("Send scheduled digests for a rate (dly, wly, mly) and exit"),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run health checks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");
    let mut config = Config::from_file(config_path)?;

    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    let config = Arc::new(config);
    init_logging(&config)?;

    info!("Starting Legal Alerts Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", config_path);

    let app_state = initialize_components(config.clone())?;

    if matches.get_flag("check-health") {
        app_state.store.health_check()?;
        info!("All health checks passed!");
        return Ok(());
    }

    if let Some(rate_code) = matches.get_one::<String>("send-digests") {
        return run_digests(&app_state, rate_code).await;
    }

    let server = ApiServer::new(app_state.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Legal Alerts Engine started on {}:{}",
        config.server.host, config.server.port
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    app_state.store.flush().await?;
    info!("Legal Alerts Engine shut down successfully");

    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> Result<()> {
    let log_level: tracing::Level =
        config.logging.level.parse().map_err(|_| SearchError::Config {
            message: format!("Invalid log level: {}", config.logging.level),
        })?;
    let filter = tracing_subscriber::filter::LevelFilter::from_level(log_level);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);
    let layer = if config.logging.json_format {
        fmt_layer.json().with_filter(filter).boxed()
    } else {
        fmt_layer.with_filter(filter).boxed()
    };
    tracing_subscriber::registry().with(layer).init();

    info!("Logging initialized with level: {}", config.logging.level);
    Ok(())
}

/// Construct every component explicitly and wire them into the shared
/// application state. The index client is built once here and handed to
/// the registry and percolation engine.
fn initialize_components(config: Arc<Config>) -> Result<AppState> {
    info!("Initializing application components...");

    let store = Arc::new(AlertStore::new(config.storage.clone())?);
    let index: Arc<dyn legal_alerts::index::IndexClient> =
        Arc::new(HttpIndexClient::new(&config.engine)?);
    let registry = Arc::new(PercolatorRegistry::new(index.clone()));
    let percolation = Arc::new(PercolationEngine::new(
        index.clone(),
        config.alerts.clone(),
    ));
    let notifier = Arc::new(HttpNotifier::new(config.notifications.clone())?);
    let dispatcher = Arc::new(AlertDispatcher::new(store.clone(), notifier));

    store.health_check()?;
    info!("All components initialized successfully");

    Ok(AppState {
        config,
        store,
        index,
        registry,
        percolation,
        dispatcher,
    })
}

/// One-shot digest mode: send every pending digest for a rate and exit.
async fn run_digests(app_state: &AppState, rate_code: &str) -> Result<()> {
    let rate = Rate::from_code(rate_code).ok_or_else(|| SearchError::ValidationFailed {
        field: "send-digests".to_string(),
        reason: format!("'{}' is not a rate code", rate_code),
    })?;

    let notifier = Arc::new(HttpNotifier::new(
        app_state.config.notifications.clone(),
    )?);
    let runner = DigestRunner::new(
        app_state.store.clone(),
        notifier,
        app_state.config.alerts.clone(),
    );
    let summary = runner.send_scheduled_alerts(rate).await?;
    info!(
        "Digest run complete: {} users notified, {} hits delivered, {} purged",
        summary.users_notified, summary.hits_delivered, summary.purged
    );
    app_state.store.flush().await?;
    Ok(())
}
