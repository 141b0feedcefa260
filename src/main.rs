use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use receipt_agent::channels::{
    HttpBridgeAdapter, ListenerConfig, MessageListener, SharedAdapter,
};
use receipt_agent::config::Config;
use receipt_agent::error::Result;
use receipt_agent::logging;
use receipt_agent::pipeline::{Orchestrator, OrchestratorConfig};
use receipt_agent::processor::BackendClient;
use receipt_agent::server::ControlPlaneServer;
use receipt_agent::store::{LibSqlStore, TransactionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let _log_guard = logging::init(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));

    let config = match config {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                error!("Configuration error: {e}");
            }
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        monitored = config.monitored_address.as_deref().unwrap_or("(all senders)"),
        poll_interval_secs = config.poll_interval.as_secs(),
        api_port = config.api_port,
        backend = %config.backend_url,
        bridge = %config.bridge_url,
        "Receipt agent starting"
    );

    run(config).await.context("receipt agent failed")
}

/// Wire the store, channel, control plane, and orchestrator, then run until
/// a shutdown signal arrives.
async fn run(config: Config) -> Result<()> {
    // ── Store ───────────────────────────────────────────────────────────
    let store: Arc<dyn TransactionStore> = Arc::new(LibSqlStore::new_local(&config.db_path).await?);

    // ── Channel ─────────────────────────────────────────────────────────
    let adapter = SharedAdapter::new(Arc::new(HttpBridgeAdapter::new(config.bridge_url.clone())));

    let mut listener = MessageListener::new(
        adapter.clone(),
        ListenerConfig {
            monitored_address: config.monitored_address.clone(),
            page_limit: config.poll_page_limit,
            ..Default::default()
        },
    );
    listener.load_processed_ids(store.get_processed_message_ids().await?);

    // ── Control plane ───────────────────────────────────────────────────
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let server = ControlPlaneServer::start(addr, adapter.clone()).await?;

    // ── Orchestrator ────────────────────────────────────────────────────
    let backend = Arc::new(BackendClient::new(
        config.backend_url.clone(),
        config.backend_api_key.clone(),
    ));
    let mut orchestrator = Orchestrator::new(
        listener,
        Arc::clone(&store),
        backend.clone(),
        backend,
        adapter,
        OrchestratorConfig {
            chat_user_id: config.chat_user_id.clone(),
            poll_interval: config.poll_interval,
        },
    );

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        stop.stop();
    });

    orchestrator.run().await;
    orchestrator.shutdown(Some(server)).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
