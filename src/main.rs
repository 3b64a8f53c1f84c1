use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use pg_replica_router::config::{self, Config};
use pg_replica_router::health::{HealthMonitor, PgProbe};
use pg_replica_router::metrics;
use pg_replica_router::store::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let mut config = load_or_default_config();
    config.apply_env_overrides();
    config.validate()?;

    for node in &config.nodes {
        info!(role = %node.role, host = %node.host, port = config.port_for(node), "Monitoring node");
    }

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(&addr).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let store = Arc::new(RedisStore::new(&config.store)?);
    let probe = Arc::new(PgProbe::new(config.database.clone(), &config.monitor));
    let monitor = HealthMonitor::new(&config, probe, store);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    monitor.run(shutdown).await;
    Ok(())
}

/// Cancel `shutdown` once `signal` fires
///
/// If the handler cannot be installed the monitor keeps running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl-C");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to install Ctrl-C handler"),
    }
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/replica-router.toml", "replica-router.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
