//! Proxy server: accept loop and per-connection serving.
//!
//! # Responsibilities
//! - Own the listener for its whole lifetime
//! - Pair every accepted connection with a worker slot (backpressure first)
//! - Serve HTTP/1.1 on the connection with upgrade support for CONNECT
//! - Coordinate orderly shutdown: stop accepting, drain in-flight work
//!
//! # Design Decisions
//! - The worker slot is reserved before accepting, so a connection flood
//!   parks in the OS backlog instead of unbounded memory
//! - A worker stays occupied for a CONNECT tunnel's full lifetime, not just
//!   the HTTP exchange that set it up
//! - Accept errors end the loop and lead to a normal drain, not a crash

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::net::connection::ConnectionId;
use crate::net::Listener;
use crate::pool::WorkerPool;
use crate::proxy::pipeline::{self, RequestContext};
use crate::proxy::tunnel::TunnelSlot;

/// The forward proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    pool: WorkerPool,
}

impl ProxyServer {
    /// Create a server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let pool = WorkerPool::new(config.listener.workers);
        Self { config, pool }
    }

    /// Run the accept loop until shutdown is signalled or the listener fails.
    ///
    /// New connections stop being accepted as soon as shutdown fires; tasks
    /// already dispatched run to completion, bounded by the drain grace.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let deadline = Duration::from_secs(self.config.timeouts.request_secs);

        tracing::info!(
            address = %addr,
            workers = self.pool.capacity(),
            request_timeout_secs = self.config.timeouts.request_secs,
            "Proxy server starting"
        );

        loop {
            // Backpressure: hold the accept until a worker slot frees up.
            let permit = tokio::select! {
                permit = self.pool.acquire() => permit,
                _ = shutdown.recv() => break,
            };

            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::error!(error = %err, "Accept failed, closing listener");
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            };

            tracing::debug!(
                peer_addr = %peer,
                available_workers = self.pool.available(),
                "Connection dispatched"
            );

            self.pool
                .spawn(permit, move |id| handle_connection(stream, peer, id, deadline));
        }

        // Closing the listener stops new work; in-flight connections drain.
        drop(listener);
        tracing::info!(active = self.pool.active(), "Listener closed, draining connections");
        self.pool
            .drain(Duration::from_secs(self.config.timeouts.shutdown_grace_secs))
            .await;

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Serve one client connection end-to-end.
///
/// The connection is closed unconditionally when this returns, success or
/// failure.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    deadline: Duration,
) {
    let io = TokioIo::new(stream);
    let tunnels: TunnelSlot = Arc::new(Mutex::new(None));

    let service = service_fn({
        let tunnels = tunnels.clone();
        move |req| {
            let ctx = RequestContext {
                deadline,
                connection: id,
                tunnels: tunnels.clone(),
            };
            pipeline::handle(req, ctx)
        }
    });

    let served = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await;

    if let Err(err) = served {
        tracing::debug!(
            connection_id = %id,
            peer_addr = %peer,
            error = %err,
            "Connection ended with protocol error"
        );
    }

    // A CONNECT relay outlives its HTTP exchange; keep the worker occupied
    // until both legs are done.
    let pending = tunnels.lock().ok().and_then(|mut slot| slot.take());
    if let Some(relay) = pending {
        let _ = relay.await;
    }
}
