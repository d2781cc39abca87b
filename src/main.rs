//! Entity Binder Daemon
//!
//! Serves the bind API over HTTP behind an authenticating gateway.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! entity-binder
//!
//! # Start with custom config
//! entity-binder --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! entity-binder --http-port 8096 --storage-dir /data/binder
//! ```
//!
//! ## HTTP API
//!
//! - `GET  /health`                 - Health check
//! - `POST /{kind}/{add|remove}/`   - Add or remove a bind
//! - `POST /{add|remove}/`          - Same, kind given as `"type"` in the body
//! - `GET  /{kind}/?target_ct=...`  - Keys bound by the caller
//! - `POST /{kind}/state/`          - Bound/unbound for a batch of keys

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use entity_binder::services::events::spawn_logging_listener;
use entity_binder::{
    BindApi, BinderDb, Config, EntityTypeRegistry, EventBus, HeaderPrincipalExtractor,
    HttpServer, Services,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "entity-binder")]
#[command(about = "Polymorphic wishlist/blacklist association service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ENTITY_BINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "ENTITY_BINDER_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API host
    #[arg(long)]
    http_host: Option<String>,

    /// HTTP API port
    #[arg(long, env = "ENTITY_BINDER_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("entity_binder=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(host) = args.http_host {
        config.http_host = host;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    config.validate()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting entity-binder"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(BinderDb::open_with_timeout(
        &config.database_path(),
        config.busy_timeout(),
    )?);

    let registry = Arc::new(EntityTypeRegistry::from_config(&config.entity_types, db.clone())?);
    if registry.is_empty() {
        info!("No entity types configured; every add will be rejected");
    } else {
        info!(types = ?registry.type_ids(), "Entity types registered");
    }

    let events = Arc::new(EventBus::with_capacity(config.event_bus_capacity));
    let services = Arc::new(Services::sqlite(db.clone(), registry, events.clone()));
    let listener = spawn_logging_listener(events);

    let kinds = config.kinds()?;
    let api = BindApi::new(
        services,
        kinds,
        HeaderPrincipalExtractor::new(&config.principal_header_prefix),
    )
    .with_stats(db.clone());

    let http_addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .context("invalid HTTP bind address")?;
    let http_server = Arc::new(HttpServer::new(Arc::new(api), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Relation kinds: {}", config.relation_kinds.join(", "));
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    if let Ok(stats) = db.stats() {
        info!(binds = stats.bind_count, by_kind = ?stats.by_kind, "Final bind stats");
    }

    Ok(())
}
