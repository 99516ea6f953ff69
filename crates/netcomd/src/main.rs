//! netcomd: presence/registry daemon.

use anyhow::{Context, Result};

use netcom_core::config::NetcomConfig;
use netcom_core::Endpoint;
use netcomd::Server;

fn print_usage() {
    eprintln!(
        "netcomd: presence/registry service

USAGE:
    netcomd [<protocol>://<address>:<port>]

Without a URL the [server] section of the config file is used.

EXAMPLES:
    netcomd tcp://localhost:7070
    netcomd udp://@:7070          listen on every interface
    netcomd udp://10.0.0.5:7070   accept only 10.0.0.5

ENVIRONMENT:
    NETCOM_CONFIG    config file path
    RUST_LOG         log filter (e.g. netcomd=debug)"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let arg = std::env::args().nth(1);
    if matches!(arg.as_deref(), Some("-h" | "--help" | "help")) {
        print_usage();
        return Ok(());
    }

    // Load config
    if let Err(e) = NetcomConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = NetcomConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NetcomConfig::default()
    });

    if let Some(url) = arg {
        let endpoint: Endpoint = url
            .parse()
            .with_context(|| format!("invalid endpoint {url:?}"))?;
        config.set_endpoint(&endpoint);
    }
    let endpoint = config
        .endpoint()
        .with_context(|| format!("invalid server address {:?}", config.server.address))?;
    tracing::info!(%endpoint, "netcomd starting");

    let mut server = Server::new(endpoint, config.limits.clone());
    if server.start().await.is_err() {
        eprintln!(
            "Failed to start server: protocol={}, address={}, port={}: {}",
            endpoint.protocol,
            endpoint.address,
            endpoint.port,
            server.last_error()
        );
        std::process::exit(1);
    }

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received");
    server.stop().await;

    let last_error = server.last_error();
    if !last_error.is_empty() {
        tracing::info!(last_error = %last_error, "last recorded error");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    tokio::signal::ctrl_c().await.ok();
}
