//! Site watcher
//!
//! Polls registered web pages, detects content changes by fingerprint and
//! e-mails the registered recipient when a page changes.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                        SITE WATCHER                          │
//!   │                                                              │
//!   │  ┌──────────┐    ┌────────────┐    ┌───────────┐             │
//!   │  │ watchdog │───▶│ supervisor │───▶│ PollRound │──┐          │
//!   │  └──────────┘    └────────────┘    └─────┬─────┘  │          │
//!   │                                          │        │          │
//!   │                  ┌───────────────────────┘        ▼          │
//!   │                  ▼                         ┌────────────┐    │    Monitored
//!   │           ┌────────────┐  breaker/URL      │   fetch    │────┼──▶ sites
//!   │           │  notifier  │                   └────────────┘    │
//!   │           └─────┬──────┘                                     │
//!   │                 │ shared breaker, retries                    │
//!   │                 ▼                                            │
//!   │           ┌────────────┐         ┌──────────────┐            │
//!   │           │    SMTP    │         │   registry   │◀── sites.json
//!   │           └────────────┘         └──────────────┘            │
//!   │                                                              │
//!   │   config · observability · lifecycle (cross-cutting)         │
//!   └──────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use site_watcher::config::{load_config, WatcherConfig};
use site_watcher::lifecycle::{signals, Shutdown};
use site_watcher::monitor::{spawn_monitoring, Engine};
use site_watcher::notify::test_notice;
use site_watcher::observability::logging::init_logging;
use site_watcher::observability::metrics::init_metrics;
use site_watcher::observability::EngineMetrics;
use site_watcher::registry::{JsonFileRegistry, SiteRegistry};

#[derive(Parser)]
#[command(name = "site-watcher")]
#[command(about = "Watch web pages for changes and e-mail on update", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor continuously until interrupted
    Run,
    /// Run a single poll round and print the summary
    Check,
    /// List registered sites
    List,
    /// Register a site
    Add {
        url: String,
        email: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a site by URL
    Remove { url: String },
    /// Send a test notification
    TestEmail { address: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {e}");
        }
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.observability);

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Check => check(config).await?,
        Commands::List => {
            let registry = JsonFileRegistry::from_config(&config.registry);
            let targets = registry.try_load().await?;
            println!("{}", serde_json::to_string_pretty(&targets)?);
        }
        Commands::Add { url, email, name } => {
            let registry = JsonFileRegistry::from_config(&config.registry);
            let target = registry.register(&url, &email, name.as_deref()).await?;
            println!("Added {} ({})", target.url, target.display_name());
        }
        Commands::Remove { url } => {
            let registry = JsonFileRegistry::from_config(&config.registry);
            let target = registry.unregister(&url).await?;
            println!("Removed {}", target.url);
        }
        Commands::TestEmail { address } => {
            let engine = Engine::from_config(&config, Arc::new(EngineMetrics::new()))?;
            let notice = test_notice(Utc::now());
            if engine
                .notifier()
                .notify(&address, &notice.subject, &notice.body)
                .await
            {
                println!("Test message sent to {address}");
            } else {
                return Err(format!("could not send test message to {address}").into());
            }
        }
    }

    Ok(())
}

async fn run(config: WatcherConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "site-watcher starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let missing = config.smtp.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "SMTP credentials incomplete, notifications disabled");
    }

    let engine = Arc::new(Engine::from_config(&config, Arc::new(EngineMetrics::new()))?);
    if engine.notifier().is_configured() {
        engine.notifier().verify().await;
    }

    tracing::info!(
        registry = %config.registry.path,
        interval = ?config.monitor.poll_interval(),
        max_concurrent_fetches = config.monitor.max_concurrent_fetches,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let monitoring = spawn_monitoring(engine.clone(), &config.monitor, shutdown.subscribe());

    signals::wait_for_termination(&shutdown).await;
    tracing::info!("Shutting down");

    if let Err(e) = monitoring.await {
        tracing::error!(error = %e, "Watchdog task ended abnormally");
    }

    let health = engine.health();
    tracing::info!(
        total_checks = health.total_checks,
        failed_checks = health.failed_checks,
        emails_sent = health.emails_sent,
        emails_failed = health.emails_failed,
        "Shutdown complete"
    );
    Ok(())
}

async fn check(config: WatcherConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::from_config(&config, Arc::new(EngineMetrics::new()))?;
    let summary = engine.run_once().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", serde_json::to_string_pretty(&engine.health())?);
    Ok(())
}
