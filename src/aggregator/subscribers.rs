//! Bookkeeping for streaming `GET /metrics` subscribers
//!
//! Snapshots themselves reach subscribers through the registry's broadcast
//! channel; this set only tracks who is connected. It sits behind its own
//! lock so that registering a subscriber never contends with the host map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SubscriberSet {
    active: Arc<Mutex<HashMap<u64, SocketAddr>>>,

    next_id: Arc<AtomicU64>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new subscriber. It is removed again when the returned
    /// [`Subscriber`] is dropped.
    pub fn register(
        &self,
        remote_addr: SocketAddr,
        snapshots: broadcast::Receiver<Bytes>,
    ) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, remote_addr);

        info!("Client connected: {remote_addr}");

        Subscriber {
            id,
            remote_addr,
            snapshots,
            set: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remote addresses of every connected subscriber
    pub fn remote_addrs(&self) -> Vec<SocketAddr> {
        self.lock().values().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, SocketAddr>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connected `GET /metrics` stream
///
/// Dropping it (the peer disconnected, a write failed, or it fell too far
/// behind) moves it to CLOSED and releases its entry.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,

    remote_addr: SocketAddr,

    snapshots: broadcast::Receiver<Bytes>,

    set: SubscriberSet,
}

impl Subscriber {
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Wait for the next snapshot line.
    ///
    /// `None` means the subscriber must close: either the registry shut
    /// down or this subscriber lagged beyond the broadcast backlog.
    pub async fn next_line(&mut self) -> Option<Bytes> {
        match self.snapshots.recv().await {
            Ok(line) => Some(line),
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "{}: fell {skipped} snapshots behind, closing",
                    self.remote_addr
                );
                None
            }
            Err(RecvError::Closed) => {
                debug!("{}: snapshot channel closed", self.remote_addr);
                None
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
        info!("Client disconnected: {}", self.remote_addr);
    }
}
