//! Client: follows the aggregator and drives the LED strip
//!
//! Two independent loops share a [`ColorFeed`] through a watch channel:
//!
//! - **Ingest** holds one long-lived `GET /metrics` and replaces the feed on
//!   every snapshot line, reconnecting after a fixed delay on any failure
//! - **Renderer** wakes every frame period, composes a frame from whatever
//!   the feed holds and writes it to the device, reopening it lazily
//!
//! Neither loop ever waits on the other.

pub mod blinky;
pub mod color;
pub mod feed;
pub mod frame;
pub mod ingest;
pub mod render;

#[cfg(feature = "serial")]
pub use blinky::SerialConnector;
pub use blinky::{BlinkyTape, encode_frame};
pub use color::Color;
pub use feed::{ColorFeed, color_feed};
pub use frame::{Frame, FrameComposer, STATUS_SLOT};
pub use ingest::{Ingest, LineBuffer};
pub use render::{LedConnector, LedStrip, Renderer};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{config::ClientConfig, error::BlinkyResult};

pub struct Client;

impl Client {
    /// Start the ingest and render loops for `server`.
    pub fn spawn<C>(server: &str, config: &ClientConfig, connector: C) -> BlinkyResult<ClientHandle>
    where
        C: LedConnector + 'static,
    {
        let (feed_tx, feed_rx) = color_feed();

        let ingest = Ingest::new(server, config, feed_tx)?;
        let renderer = Renderer::new(config, connector, feed_rx.clone());

        info!("following {}", ingest.url());

        Ok(ClientHandle {
            feed: feed_rx,
            ingest: tokio::spawn(ingest.run()),
            render: tokio::spawn(renderer.run()),
        })
    }
}

/// The running loops of a client
pub struct ClientHandle {
    feed: watch::Receiver<ColorFeed>,

    ingest: JoinHandle<()>,

    render: JoinHandle<()>,
}

impl ClientHandle {
    /// A view of the colors currently being shown
    pub fn feed(&self) -> watch::Receiver<ColorFeed> {
        self.feed.clone()
    }

    /// Resolves only if one of the loops dies, which means it panicked.
    pub async fn join(&mut self) {
        tokio::select! {
            _ = &mut self.ingest => {}
            _ = &mut self.render => {}
        }
    }

    pub fn shutdown(self) {
        self.ingest.abort();
        self.render.abort();
    }
}
