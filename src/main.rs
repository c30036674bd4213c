use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pidash_core::{ConnectionState, DashboardConfig};
use pidash_router::{Router, TopicMap};
use pidash_telemetry::{init_telemetry, TelemetryConfig};
use pidash_transport::ReconnectPolicy;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Raspberry Pi ops dashboard: routes broker metrics to browser widgets.
#[derive(Parser, Debug)]
#[command(name = "pidash", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the HTTP port from the config file.
    #[arg(short, long)]
    port: Option<u16>,
    /// Override the archive directory from the config file.
    #[arg(long)]
    archive_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::load(path).expect("Failed to load config"),
        None => {
            let default_path = PathBuf::from("pidash.toml");
            if default_path.is_file() {
                DashboardConfig::load(&default_path).expect("Failed to load pidash.toml")
            } else {
                DashboardConfig::default()
            }
        }
    };
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(dir) = args.archive_dir {
        config.http.archive_dir = dir;
    }

    let telemetry_config = TelemetryConfig {
        log_level: config
            .telemetry
            .log_level
            .parse()
            .unwrap_or(tracing::Level::INFO),
        log_to_sqlite: config.telemetry.log_to_sqlite,
        log_db_path: config.telemetry.log_db_path.clone(),
        metrics_enabled: config.telemetry.metrics_enabled,
        metrics_db_path: config.telemetry.metrics_db_path.clone(),
        metrics_snapshot_interval_secs: config.telemetry.metrics_snapshot_interval_secs,
        metrics_retention_days: config.telemetry.metrics_retention_days,
    };
    let snapshot_interval = telemetry_config.metrics_snapshot_interval_secs;
    let retention_days = telemetry_config.metrics_retention_days;
    let telemetry = init_telemetry(telemetry_config);
    let metrics = telemetry.metrics();

    tracing::info!("Starting pidash");

    let shutdown = CancellationToken::new();
    let connection = Arc::new(ConnectionState::new());
    let map = Arc::new(TopicMap::new(&config.rules));
    tracing::info!(rules = map.len(), "topic table loaded");

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let policy = ReconnectPolicy::new(&config.broker.reconnect);
    let mqtt = pidash_transport::start(
        &config.broker,
        map.wire_patterns(),
        Arc::clone(&connection),
        inbound_tx,
        policy,
        shutdown.clone(),
    )
    .expect("Failed to start broker transport");

    let router = Arc::new(Router::new(
        mqtt.transport.clone(),
        Arc::clone(&connection),
    ));

    let _ingest = pidash_server::spawn_ingest(
        map,
        Arc::clone(&router),
        metrics.clone(),
        inbound_rx,
        shutdown.clone(),
    );

    if let Some(metrics) = metrics.clone() {
        let snapshot_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(snapshot_interval));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = snapshot_shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(err) = metrics.snapshot() {
                    tracing::warn!(error = %err, "metrics snapshot failed");
                }
                if let Err(err) = metrics.prune(retention_days) {
                    tracing::warn!(error = %err, "metrics prune failed");
                }
            }
        });
    }

    let handle = pidash_server::start(
        config.http.clone(),
        router,
        connection,
        metrics,
        shutdown.clone(),
    )
    .await
    .expect("Failed to start server");

    tracing::info!(port = handle.port, "pidash ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
    shutdown.cancel();
    mqtt.task.await.ok();
}
