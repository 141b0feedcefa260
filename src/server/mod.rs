//! Control-plane HTTP server.
//!
//! Runs independently of the polling loop and shares its adapter session, so
//! forced sends and orchestrator replies are serialized at the adapter.

pub mod routes;

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channels::shared::SharedAdapter;
use crate::error::Error;

pub use routes::control_routes;

/// A running control-plane server.
pub struct ControlPlaneServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ControlPlaneServer {
    /// Bind `addr` and start serving in the background.
    ///
    /// Binding happens before this returns, so a port that is already taken
    /// surfaces here as [`Error::Bind`].
    pub async fn start(addr: SocketAddr, adapter: SharedAdapter) -> Result<Self, Error> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        let app = control_routes(adapter);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Control-plane server exited with error");
            }
        });

        info!(addr = %local_addr, "Control-plane server listening");
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// Address actually bound (useful when started on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Control-plane server task failed");
        }
        info!(addr = %self.local_addr, "Control-plane server stopped");
    }
}
