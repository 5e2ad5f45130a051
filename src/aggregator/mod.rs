//! Aggregator: fan-in of agent samples, fan-out of snapshots
//!
//! ## Endpoints
//!
//! - `GET /` - HTML summary of registered hosts
//! - `POST /metrics` - submit `{"hostName": ..., "cpuUsage": ...}`
//! - `GET /metrics` - newline-delimited JSON snapshot stream
//!
//! ## Architecture
//!
//! - **Axum** handlers, one task per connection, each write bounded by the
//!   flush timeout
//! - **RegistryActor** owns the host map, prunes silent hosts and
//!   publishes a snapshot every broadcast period
//! - **Broadcast channel** fans each snapshot out to every subscriber

pub mod actor;
pub mod conn;
pub mod error;
pub mod registry;
pub mod routes;
pub mod subscribers;

pub use actor::RegistryHandle;
pub use error::{ApiError, ApiResult};
pub use registry::{HostRecord, HostRegistry, parse_sample};
pub use routes::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, routing::get};
use tokio::{
    net::TcpListener,
    sync::{oneshot, watch},
    task::{JoinHandle, JoinSet},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::AggregatorConfig;

/// Build the aggregator router on top of `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::summary))
        .route(
            "/metrics",
            get(routes::stream_metrics).post(routes::submit_metrics),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// A bound, not yet serving aggregator
pub struct Aggregator {
    listener: TcpListener,

    state: AppState,

    /// Longest a write to one peer may stay blocked
    flush_timeout: Duration,
}

impl Aggregator {
    /// Bind the listener and start the registry actor.
    pub async fn bind(config: &AggregatorConfig) -> anyhow::Result<Self> {
        let bind_addr = SocketAddr::new(config.address, config.port);

        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;

        Ok(Self {
            listener,
            state: AppState::new(RegistryHandle::spawn(config)),
            flush_timeout: config.flush_timeout(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.state.registry
    }

    /// Serve until `shutdown` resolves. The registry actor is stopped first
    /// so that open snapshot streams end and connections can drain.
    pub async fn serve_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let registry = self.state.registry.clone();
        let app = router(self.state);
        let listener = self.listener;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut shutdown = std::pin::pin!(shutdown);

        info!("BlinkyMetricsServer started, and accepting connections on: {addr}");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("failed to accept connection: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    debug!("accepted connection from {remote_addr}");
                    connections.spawn(conn::serve_connection(
                        socket,
                        remote_addr,
                        app.clone(),
                        self.flush_timeout,
                        stop_rx.clone(),
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        info!("shutting down");
        drop(listener);
        if let Err(e) = registry.shutdown().await {
            warn!("{e:#}");
        }

        let _ = stop_tx.send(true);
        while connections.join_next().await.is_some() {}

        Ok(())
    }

    /// Serve in a background task.
    pub fn spawn(self) -> anyhow::Result<AggregatorHandle> {
        let addr = self.local_addr()?;
        let registry = self.state.registry.clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(self.serve_until(async move {
            let _ = stop_rx.await;
        }));

        Ok(AggregatorHandle {
            addr,
            registry,
            stop: stop_tx,
            task,
        })
    }
}

/// Bind with `config` and serve in the background.
pub async fn spawn_aggregator(config: &AggregatorConfig) -> anyhow::Result<AggregatorHandle> {
    Aggregator::bind(config).await?.spawn()
}

/// A running background aggregator
pub struct AggregatorHandle {
    addr: SocketAddr,

    registry: RegistryHandle,

    stop: oneshot::Sender<()>,

    task: JoinHandle<anyhow::Result<()>>,
}

impl AggregatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Stop serving. Connections that do not drain in time are cut.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.stop.send(());

        let mut task = self.task;
        match tokio::time::timeout(Duration::from_secs(2), &mut task).await {
            Ok(result) => result.context("aggregator task panicked")?,
            Err(_) => {
                warn!("aggregator did not drain in time, aborting");
                task.abort();
                Ok(())
            }
        }
    }
}
