//! HTTP serving engine with drain control.
//!
//! # Responsibilities
//! - Wrap the Axum router with request ID, tracing and timeout middleware
//! - Run the accept loop and one task per connection (HTTP/1.1 and HTTP/2)
//! - Stop accepting and drain connections on graceful stop
//! - Cut every connection on force stop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::lifecycle::drain::{
    drain_channel, DrainCompletion, DrainController, DrainError, DrainNotifier, DrainReceiver,
    ForceStopReport,
};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// HTTP server bound to a [`Listener`].
pub struct HttpServer {
    router: Router,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server for `router` with the configured middleware applied.
    pub fn new(router: Router, config: &ListenerConfig) -> Self {
        Self {
            router: Self::build_router(router, config),
            tracker: ConnectionTracker::new(),
        }
    }

    #[allow(deprecated)]
    fn build_router(router: Router, config: &ListenerConfig) -> Router {
        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Start serving on a background task.
    pub fn spawn(self, listener: Listener) -> Result<ServerHandle, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let graceful = CancellationToken::new();
        let force = CancellationToken::new();
        let (notifier, drained) = drain_channel();

        tracing::info!(address = %local_addr, "HTTP server starting");

        tokio::spawn(accept_loop(
            listener,
            self.router,
            self.tracker.clone(),
            graceful.clone(),
            force.clone(),
            notifier,
        ));

        Ok(ServerHandle {
            local_addr,
            tracker: self.tracker,
            graceful,
            force,
            stopping: AtomicBool::new(false),
            drained,
        })
    }
}

/// Control handle for a running [`HttpServer`].
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    tracker: ConnectionTracker,
    graceful: CancellationToken,
    force: CancellationToken,
    stopping: AtomicBool,
    drained: DrainReceiver,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn is_drained(&self) -> bool {
        self.drained.is_drained()
    }
}

impl DrainController for ServerHandle {
    fn begin_graceful_stop(&self) -> Result<DrainCompletion, DrainError> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Err(DrainError::AlreadyStopping);
        }
        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopping listener, draining connections"
        );
        self.graceful.cancel();
        Ok(self.drained.completion())
    }

    fn force_stop(&self) -> ForceStopReport {
        if self.drained.is_drained() || self.force.is_cancelled() {
            tracing::debug!("Force stop after drain, nothing to do");
            return ForceStopReport::default();
        }
        let abandoned = self.tracker.active_count();
        tracing::warn!(active_connections = abandoned, "Force stopping HTTP server");
        self.stopping.store(true, Ordering::SeqCst);
        self.graceful.cancel();
        self.force.cancel();
        ForceStopReport { abandoned }
    }
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    tracker: ConnectionTracker,
    graceful: CancellationToken,
    force: CancellationToken,
    notifier: DrainNotifier,
) {
    loop {
        tokio::select! {
            _ = graceful.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        router.clone(),
                        guard,
                        permit,
                        graceful.clone(),
                        force.clone(),
                    ));
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener failed, no longer accepting");
                    break;
                }
            }
        }
    }

    drop(listener);
    tracing::info!(
        active_connections = tracker.active_count(),
        "Listener closed, waiting for in-flight connections"
    );
    tracker.wait_idle().await;
    tracing::info!("HTTP server stopped");
    notifier.notify();
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    graceful: CancellationToken,
    force: CancellationToken,
) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, error = %e, "Connection error");
                }
                break;
            }
            _ = graceful.cancelled(), if !draining => {
                draining = true;
                tracing::trace!(connection_id = %guard.id(), "Draining connection");
                conn.as_mut().graceful_shutdown();
            }
            _ = force.cancelled() => {
                tracing::warn!(connection_id = %guard.id(), peer_addr = %peer, "Connection abandoned");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn spawn_server() -> ServerHandle {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        let router = Router::new().route("/", get(|| async { "ok" }));
        HttpServer::new(router, &config).spawn(listener).unwrap()
    }

    #[tokio::test]
    async fn idle_server_drains_immediately() {
        let handle = spawn_server().await;
        let completion = handle.begin_graceful_stop().unwrap();
        tokio::time::timeout(Duration::from_secs(1), completion)
            .await
            .expect("idle server should drain")
            .unwrap();
        assert!(handle.is_drained());
        assert!(TcpStream::connect(handle.local_addr()).await.is_err());
    }

    #[tokio::test]
    async fn graceful_stop_only_once() {
        let handle = spawn_server().await;
        let _completion = handle.begin_graceful_stop().unwrap();
        assert_eq!(
            handle.begin_graceful_stop().unwrap_err(),
            DrainError::AlreadyStopping
        );
    }

    #[tokio::test]
    async fn force_stop_after_drain_is_noop() {
        let handle = spawn_server().await;
        handle.begin_graceful_stop().unwrap().await.unwrap();

        assert_eq!(handle.force_stop(), ForceStopReport::default());
        assert_eq!(handle.force_stop(), ForceStopReport::default());
    }

    #[tokio::test]
    async fn force_stop_closes_open_connections() {
        let handle = spawn_server().await;
        let _client = TcpStream::connect(handle.local_addr()).await.unwrap();

        let mut waited = 0;
        while handle.active_connections() == 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(handle.active_connections(), 1);

        let completion = handle.begin_graceful_stop().unwrap();
        let report = handle.force_stop();
        assert!(report.abandoned <= 1);

        tokio::time::timeout(Duration::from_secs(1), completion)
            .await
            .expect("force stop should release connections")
            .unwrap();
        assert_eq!(handle.active_connections(), 0);
    }
}
