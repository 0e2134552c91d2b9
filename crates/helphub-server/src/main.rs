mod admin;
mod config;
mod console;
mod discovery;
mod error;
mod framed;
mod msglog;
mod relay;
mod session;
mod sweeper;
mod tls;
mod web;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use helphub_store::Queue;

use crate::config::ServerConfig;
use crate::msglog::MessageLog;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,helphub_server=debug")),
        )
        .init();

    info!(
        "Starting HelpHub relay server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // Startup requirements: a passphrase for the keystore, a usable
    // keystore, and an openable queue. Any failure here exits non-zero.
    let keystore_password = std::env::var("KEYSTORE_PASSWORD")
        .map_err(|_| anyhow::anyhow!("KEYSTORE_PASSWORD environment variable not set"))?;
    let tls_config = Arc::new(tls::load_server_config(
        &config.keystore_path,
        &keystore_password,
    )?);

    if config.admin_password.is_none() {
        warn!("ADMIN_PASSWORD not set; all control-plane requests will be rejected");
    }

    let queue = Arc::new(Queue::open(&config.data_dir)?);
    let msglog = Arc::new(MessageLog::new(config.message_log_path.clone()));
    let relay = Arc::new(Relay::new(queue, msglog.clone()));

    let shutdown = CancellationToken::new();

    let _sweeper = sweeper::spawn(relay.clone(), config.connection_timeout, shutdown.clone());
    let _console = console::spawn(relay.clone(), msglog.clone());
    info!("Admin console started. Type 'help' for a list of commands.");

    let mdns = discovery::announce(config.http_port);
    discovery::log_site_local_addresses(config.http_port);

    let framed = tokio::spawn(framed::run_listener(
        config.clone(),
        tls_config,
        relay.clone(),
        shutdown.clone(),
    ));
    let control = tokio::spawn(admin::run_listener(
        config.clone(),
        relay.clone(),
        shutdown.clone(),
    ));

    tokio::select! {
        result = web::serve(config, relay.clone(), shutdown.clone()) => result?,
        result = framed => result??,
        result = control => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Ordered teardown: withdraw discovery, stop the background tasks and
    // listeners, close every live session; the queue is released on drop.
    mdns.shutdown();
    shutdown.cancel();
    relay.close_all_sessions();

    Ok(())
}
