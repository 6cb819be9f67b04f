//! statecastd: Statecast relay daemon.
//!
//! Usage: statecastd [PORT]

use anyhow::Result;

use statecast_core::config::RelayConfig;
use statecastd::start_relay;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        tracing::error!("statecastd failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut config = RelayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RelayConfig::default()
    });

    if let Some(arg) = std::env::args().nth(1) {
        if !config.apply_port_arg(&arg) {
            tracing::warn!(
                arg = %arg,
                port = config.network.port,
                "invalid port argument, using configured port"
            );
        }
    }
    tracing::info!(addr = %config.socket_addr(), "statecastd starting");

    let mut relay = start_relay(config).await?;

    let loop_exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            false
        }
        _ = relay.wait() => true,
    };
    if loop_exited {
        anyhow::bail!("relay loop exited unexpectedly");
    }

    relay.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}
