mod cli;
mod hub;
mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weather_core::{WeatherClient, WeatherKeeper};

use crate::cli::Args;
use crate::hub::{forward, Hub};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = args.resolve().context("failed to load configuration")?;

    let client = Arc::new(
        WeatherClient::from_config(&config.api).context("failed to build weather client")?,
    );
    let hub = Hub::new(config.server.channel_capacity);

    let keepers: Vec<WeatherKeeper> = config
        .locations
        .iter()
        .map(|&geoid| {
            let keeper = WeatherKeeper::spawn(client.clone(), geoid, config.keeper);
            forward(hub.clone(), keeper.subscribe());
            keeper
        })
        .collect();
    info!(
        locations = ?config.locations,
        interval_ms = config.keeper.sync_interval_ms,
        base_url = %client.base_url(),
        "weather keepers running"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on {addr}");

    axum::serve(listener, server::router(hub))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for keeper in keepers {
        let geoid = keeper.geoid();
        match tokio::time::timeout(SHUTDOWN_GRACE, keeper.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(geoid, error = %err, "keeper task failed"),
            Err(_) => warn!(geoid, "keeper still fetching at shutdown, abandoning"),
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
