use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedcast::config::{Config, StorageKind};
use feedcast::feed::HttpClient;
use feedcast::notify::StdoutDispatcher;
use feedcast::scheduler::Scheduler;
use feedcast::storage::{FileStore, SqliteStore, Store};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Get the config directory path (~/.config/feedcast/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedcast"))
}

#[derive(Parser, Debug)]
#[command(name = "feedcast", about = "Announce new feed entries to channels")]
struct Args {
    /// Configuration file (default: ~/.config/feedcast/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single cycle immediately and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration, list the feeds and exit
    #[arg(long)]
    check: bool,
}

async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let dir = config.directory();
    let store: Arc<dyn Store> = match config.storage {
        StorageKind::Files => Arc::new(
            FileStore::open(&dir)
                .await
                .with_context(|| format!("Failed to open storage directory {}", dir.display()))?,
        ),
        StorageKind::Sqlite => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let db_path = dir.join("feedcast.db");
            let db_path_str = db_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
            Arc::new(
                SqliteStore::open(db_path_str)
                    .await
                    .context("Failed to open database")?,
            )
        }
    };
    Ok(store)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down gracefully"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let settings = config.settings()?;
    let registry = config.registry()?;

    if args.check {
        println!(
            "{}: {} feeds, storage {:?} in {}",
            config_path.display(),
            registry.len(),
            config.storage,
            config.directory().display()
        );
        for feed in registry.iter() {
            println!(
                "  {} every {}m -> {} ({} url{})",
                feed.name,
                feed.delay.as_secs() / 60,
                feed.channels.join(","),
                feed.urls.len(),
                if feed.urls.len() == 1 { "" } else { "s" }
            );
        }
        return Ok(());
    }

    if registry.is_empty() {
        tracing::warn!(path = %config_path.display(), "No feeds configured");
    }

    let store = open_store(&config).await?;
    let client = HttpClient::new(config.user_agent.clone(), config.request_timeout())
        .context("Failed to build HTTP client")?;

    let scheduler = Scheduler::new(
        registry,
        store,
        Arc::new(client),
        Arc::new(StdoutDispatcher),
        settings,
    )
    .with_hook(config.hook.build());

    if args.once {
        let mut scheduler = scheduler;
        let report = scheduler.run_cycle(Utc::now()).await;
        report.log();
        return Ok(());
    }

    scheduler.run(shutdown_signal()).await;
    Ok(())
}
