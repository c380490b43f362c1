//! lprgate Server
//!
//! This server provides:
//! - Camera webhook endpoints that record plate events
//! - Local SQLite buffering while PostgreSQL is unreachable
//! - Automatic promotion to PostgreSQL and migration of buffered events
//! - Entry notifications through the messaging relay
//! - A records API and capture images for the frontend
//!
//! Usage:
//! ```bash
//! # With environment variables (or a .env file)
//! WEBHOOK_PORT=8080 DATABASE_URL=postgres://lpr:secret@db/lpr lprgate-server
//!
//! # With a config file (env vars override it)
//! lprgate-server --config lprgate.yaml
//! ```

mod access;
mod app;
mod bootstrap;
mod captures;
mod config;
mod handlers;
mod health;
mod metrics;

use clap::Parser;
use config::ServerConfig;
use lprgate_persistence::PromotionMonitor;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const BANNER: &str = r#"
  ┌──────────────────────────────────┐
  │  lprgate  ▸  plate event gateway │
  └──────────────────────────────────┘
  version : {VERSION}
"#;

/// lprgate Server - License plate camera gateway
#[derive(Parser)]
#[command(name = "lprgate-server")]
#[command(about = "Webhook receiver and records API for license plate cameras", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "LPRGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let (mut config, source) = match cli.config {
        Some(path) => (ServerConfig::from_file(&path)?, path),
        None => (ServerConfig::default(), "defaults".to_string()),
    };

    // Merge environment variables (they override config file)
    let warnings = config.merge_env()?;
    let port = config.validate()?;

    init_tracing(&config)?;

    println!("{}", BANNER.replace("{VERSION}", env!("CARGO_PKG_VERSION")));
    info!("📁 Configuration loaded from {}", source);
    for warning in &warnings {
        warn!("{}", warning);
    }

    let services = bootstrap::build(&config).await?;
    let storage = services.storage().clone();

    let mode = storage.initialize().await?;
    info!("💾 Active store: {}", mode);

    // Drain anything left from a previous offline period before serving
    let outcome = storage.try_promote_and_migrate().await;
    if outcome.promoted || outcome.migrated > 0 {
        info!(
            "💾 Startup sync: promoted={}, migrated={}",
            outcome.promoted, outcome.migrated
        );
    }

    let monitor = PromotionMonitor::new(storage.clone(), &config.sync);
    info!(
        "🔄 Promotion monitor every {}s",
        monitor.interval().as_secs()
    );
    let _monitor = monitor.spawn();

    let captures = services.state.captures.clone();
    if let Err(e) = captures.ensure_directory().await {
        warn!(
            "Failed to create captures directory {}: {}",
            captures.directory().display(),
            e
        );
    }
    let _cleanup = captures.spawn_cleanup(
        config.captures.retention(),
        config.captures.cleanup_interval(),
    );
    info!(
        "🖼️  Captures kept for {} day(s)",
        config.captures.retention_days
    );

    let _relay_watch = services
        .notifier()
        .cloned()
        .map(|notifier| notifier.spawn_status_watch(bootstrap::relay_alert_interval(&config)));

    let app = app::router(services.state, services.allow_list);

    // Start server
    let listener = bind_listener(&config.host, port).await?;
    let addr = listener.local_addr()?;

    info!("");
    info!("✅ lprgate listening on http://{}", addr);
    info!("   Camera webhook:  http://{}/NotificationInfo/TollgateInfo", addr);
    info!("   Records API:     http://{}/api/records", addr);
    info!("   Health check:    http://{}/api/health", addr);
    info!("   Prometheus:      http://{}/metrics", addr);
    info!("");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Bind the HTTP listener; `host` may be a name, an IPv4 or a bare IPv6 address
async fn bind_listener(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Initialize tracing with configured level and sqlx query control
fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // sqlx logs every statement at info; keep it quiet unless asked
    if !config.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Failed to set sqlx log filter: {}", e),
        }
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
