//! Ingest loop - follows the aggregator's snapshot stream
//!
//! ```text
//! GET /metrics → split into lines → parse Snapshot → publish ColorFeed
//!      ↑                                                   │
//!      └──── wait reconnect delay ←── stream ended / error ┘
//! ```

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    LinkState, Snapshot,
    config::ClientConfig,
    error::{BlinkyError, BlinkyResult},
    util::metrics_url,
};

use super::feed::ColorFeed;

/// Longest line accepted from the stream before the connection is dropped
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Splits a byte stream into newline terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the
    /// newline. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> BlinkyResult<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = std::str::from_utf8(&raw[..end])
                .map_err(|e| BlinkyError::ProtocolViolation(format!("line is not utf-8: {e}")))?
                .trim();

            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        if self.pending.len() > MAX_LINE_LEN {
            let len = self.pending.len();
            self.pending.clear();
            return Err(BlinkyError::ProtocolViolation(format!(
                "line exceeds {MAX_LINE_LEN} bytes ({len} buffered)"
            )));
        }

        Ok(lines)
    }

    /// Bytes of an incomplete trailing line
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

pub struct Ingest {
    /// Aggregator stream endpoint
    url: String,

    client: reqwest::Client,

    feed: watch::Sender<ColorFeed>,

    reconnect_delay: Duration,

    /// Longest gap between chunks before the stream is considered dead
    read_timeout: Duration,

    link: LinkState,

    /// Host count of the last snapshot, logged when it changes
    host_count: Option<usize>,
}

impl Ingest {
    pub fn new(
        server: &str,
        config: &ClientConfig,
        feed: watch::Sender<ColorFeed>,
    ) -> BlinkyResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            url: metrics_url(server),
            client,
            feed,
            reconnect_delay: config.reconnect_delay(),
            read_timeout: config.read_timeout(),
            link: LinkState::Disconnected,
            host_count: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    /// Follow the stream forever, reconnecting after every failure.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn run(mut self) {
        loop {
            self.follow_once().await;
            sleep(self.reconnect_delay).await;
        }
    }

    /// One connection attempt. When it ends the host colors are withdrawn,
    /// so the strip falls back to the heartbeat right away.
    pub async fn follow_once(&mut self) {
        let Err(e) = self.connect_once().await else {
            return;
        };

        self.withdraw_hosts();

        if self.link.transition(LinkState::Disconnected) {
            warn!("Attempting to automatically reconnect to {} due to: {e}", self.url);
        } else {
            debug!("still disconnected: {e}");
        }
    }

    /// Open one stream and consume it until it ends or fails.
    ///
    /// Always returns an error: a stream that ends cleanly still means the
    /// aggregator went away.
    pub async fn connect_once(&mut self) -> BlinkyResult<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        if self.link.transition(LinkState::Connected) {
            info!("Successfully connected to {}", self.url);
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();

        loop {
            let chunk = match timeout(self.read_timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => {
                    return Err(BlinkyError::TransportFailure(
                        "stream closed by aggregator".to_string(),
                    ));
                }
                Err(_) => {
                    return Err(BlinkyError::TransportFailure(format!(
                        "no data for {:?}",
                        self.read_timeout
                    )));
                }
            };

            for line in lines.push(&chunk)? {
                self.handle_line(&line)?;
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> BlinkyResult<()> {
        match Snapshot::from_line(line) {
            Ok(snapshot) => {
                self.publish(&snapshot);
                Ok(())
            }
            Err(e) => {
                warn!("Dropping malformed snapshot line: {e}");
                Err(e)
            }
        }
    }

    fn publish(&mut self, snapshot: &Snapshot) {
        trace!("snapshot with {} hosts", snapshot.len());

        if self.host_count != Some(snapshot.len()) {
            info!("Receiving data for {} hosts", snapshot.len());
            self.host_count = Some(snapshot.len());
        }

        self.feed
            .send_replace(ColorFeed::from_snapshot(snapshot, Instant::now()));
    }

    /// Drop the host colors but keep the time of the last snapshot.
    fn withdraw_hosts(&mut self) {
        self.host_count = None;
        self.feed.send_if_modified(|feed| {
            let had_hosts = !feed.colors.is_empty();
            feed.colors.clear();
            had_hosts
        });
    }
}
