//! Render loop - pushes the current colors to the LED strip
//!
//! ```text
//! Timer tick → ensure device → compose frame from ColorFeed → render_frame
//!                   │                                              │
//!                   └── open failed: skip tick      write failed: ─┘ drop device
//! ```
//!
//! The loop ticks on its own timer regardless of ingest, which is what lets
//! the heartbeat keep blinking while the aggregator is unreachable.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use crate::{LinkState, config::ClientConfig, error::BlinkyResult};

use super::{
    feed::ColorFeed,
    frame::{Frame, FrameComposer},
};

/// An addressable LED strip
#[async_trait]
pub trait LedStrip: Send {
    /// Human readable device name for logs
    fn name(&self) -> &str;

    /// Show `frame`. Any error means the device is gone and will be reopened.
    async fn render_frame(&mut self, frame: &Frame) -> BlinkyResult<()>;
}

/// Opens an [`LedStrip`] on demand
#[async_trait]
pub trait LedConnector: Send + Sync {
    async fn connect(&self) -> BlinkyResult<Box<dyn LedStrip>>;
}

pub struct Renderer<C: LedConnector> {
    connector: C,

    /// Open device, exclusively owned by this loop
    strip: Option<Box<dyn LedStrip>>,

    link: LinkState,

    /// Whether "no device" has been logged since the last successful open
    missing_logged: bool,

    composer: FrameComposer,

    feed: watch::Receiver<ColorFeed>,

    frame_period: Duration,
}

impl<C: LedConnector> Renderer<C> {
    pub fn new(config: &ClientConfig, connector: C, feed: watch::Receiver<ColorFeed>) -> Self {
        Self {
            connector,
            strip: None,
            link: LinkState::Disconnected,
            missing_logged: false,
            composer: FrameComposer::new(config, Instant::now()),
            feed,
            frame_period: config.frame_period(),
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("rendering a frame every {:?}", self.frame_period);

        let mut ticker = interval(self.frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let _ = self.render_tick(Instant::now()).await;
        }
    }

    /// Render one frame for `now`, returning what was sent.
    pub async fn render_tick(&mut self, now: Instant) -> BlinkyResult<Frame> {
        let frame = {
            let feed = self.feed.borrow();
            self.composer.compose(&feed, now)
        };

        let mut strip = match self.strip.take() {
            Some(strip) => strip,
            None => self.open().await?,
        };

        match strip.render_frame(&frame).await {
            Ok(()) => {
                if self.link.transition(LinkState::Connected) {
                    info!("Found connection to Blinky device {}", strip.name());
                }
                self.strip = Some(strip);
                Ok(frame)
            }
            Err(e) => {
                // dropping the strip closes the port
                if self.link.transition(LinkState::Disconnected) {
                    warn!("Blinky device {} appears to have disconnected: {e}", strip.name());
                }
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> BlinkyResult<Box<dyn LedStrip>> {
        match self.connector.connect().await {
            Ok(strip) => {
                debug!("opened Blinky device {}", strip.name());
                self.missing_logged = false;
                Ok(strip)
            }
            Err(e) => {
                if !self.missing_logged {
                    warn!("No Blinky device available: {e}");
                    self.missing_logged = true;
                }
                Err(e)
            }
        }
    }
}
