//! RegistryActor - sole owner of the host map
//!
//! ## Message Flow
//!
//! ```text
//! POST /metrics ──Upsert──▶ ┌───────────────┐ ──Bytes──▶ Broadcast ──▶ [Subscriber, ...]
//! GET /         ──Summary─▶ │ RegistryActor │
//! GET /metrics  ─Subscribe▶ └───────────────┘
//!                                ▲      ▲
//!                     prune tick ┘      └ broadcast tick
//! ```
//!
//! Upserts, prunes and snapshot construction all run on this one task, so
//! they are linearizable without any locking: an upsert processed after a
//! prune re-registers the host, one processed before it refreshes the
//! record so the prune keeps it.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{HostMetric, Snapshot, config::AggregatorConfig};

use super::registry::{HostRecord, HostRegistry};

/// Commands that can be sent to the [`RegistryActor`]
#[derive(Debug)]
pub enum RegistryCommand {
    /// Record a validated sample; replies `true` if the host is new
    Upsert {
        sample: HostMetric,
        respond_to: oneshot::Sender<bool>,
    },

    /// All registered hosts in registration order, for the summary page
    Summary {
        respond_to: oneshot::Sender<Vec<HostRecord>>,
    },

    /// The snapshot that would be broadcast right now
    Snapshot { respond_to: oneshot::Sender<Snapshot> },

    /// Receiver for every snapshot broadcast from now on
    Subscribe {
        respond_to: oneshot::Sender<broadcast::Receiver<Bytes>>,
    },

    /// Prune immediately instead of waiting for the next tick
    PruneNow {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Stop the actor; open subscriber streams end
    Shutdown,
}

pub struct RegistryActor {
    registry: HostRegistry,

    command_rx: mpsc::Receiver<RegistryCommand>,

    /// Only this actor holds the sender, so subscribers see `Closed` once it
    /// stops
    snapshot_tx: broadcast::Sender<Bytes>,

    broadcast_period: Duration,

    prune_period: Duration,
}

impl RegistryActor {
    pub fn new(config: &AggregatorConfig, command_rx: mpsc::Receiver<RegistryCommand>) -> Self {
        let (snapshot_tx, _) = broadcast::channel(config.subscriber_backlog);

        Self {
            registry: HostRegistry::new(config.prune_window()),
            command_rx,
            snapshot_tx,
            broadcast_period: config.broadcast_period(),
            prune_period: config.prune_period(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting registry actor (broadcast every {:?}, prune every {:?})",
            self.broadcast_period, self.prune_period
        );

        let mut broadcast_ticker = interval(self.broadcast_period);
        broadcast_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut prune_ticker = interval(self.prune_period);
        prune_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = broadcast_ticker.tick() => {
                    self.broadcast();
                }

                _ = prune_ticker.tick() => {
                    self.registry.prune(Instant::now());
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(RegistryCommand::Upsert { sample, respond_to }) => {
                            let is_new = self.registry.upsert(sample, Instant::now());
                            let _ = respond_to.send(is_new);
                        }

                        Some(RegistryCommand::Summary { respond_to }) => {
                            let records = self.registry.records().into_iter().cloned().collect();
                            let _ = respond_to.send(records);
                        }

                        Some(RegistryCommand::Snapshot { respond_to }) => {
                            let _ = respond_to.send(self.registry.snapshot(Instant::now()));
                        }

                        Some(RegistryCommand::Subscribe { respond_to }) => {
                            let _ = respond_to.send(self.snapshot_tx.subscribe());
                        }

                        Some(RegistryCommand::PruneNow { respond_to }) => {
                            let _ = respond_to.send(self.registry.prune(Instant::now()));
                        }

                        Some(RegistryCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        info!("registry actor stopped");
    }

    fn broadcast(&self) {
        let snapshot = self.registry.snapshot(Instant::now());

        let line = match snapshot.to_line() {
            Ok(line) => Bytes::from(line),
            Err(e) => {
                error!("failed to serialize snapshot: {e}");
                return;
            }
        };

        // No receivers just means nobody is subscribed right now.
        match self.snapshot_tx.send(line) {
            Ok(receivers) => {
                trace!("published {} hosts to {receivers} subscribers", snapshot.len());
            }
            Err(_) => {
                trace!("no subscribers for snapshot");
            }
        }
    }
}

/// Handle for talking to a [`RegistryActor`]
///
/// Cheap to clone; every HTTP handler holds one.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the actor on the current runtime and return its handle.
    pub fn spawn(config: &AggregatorConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let actor = RegistryActor::new(config, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn upsert(&self, sample: HostMetric) -> Result<bool> {
        self.request(|respond_to| RegistryCommand::Upsert { sample, respond_to })
            .await
    }

    pub async fn summary(&self) -> Result<Vec<HostRecord>> {
        self.request(|respond_to| RegistryCommand::Summary { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|respond_to| RegistryCommand::Snapshot { respond_to })
            .await
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<Bytes>> {
        self.request(|respond_to| RegistryCommand::Subscribe { respond_to })
            .await
    }

    pub async fn prune_now(&self) -> Result<Vec<String>> {
        self.request(|respond_to| RegistryCommand::PruneNow { respond_to })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RegistryCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .context("registry actor is not running")?;

        rx.await.context("failed to receive response")
    }
}
