//! State shared between the ingest and render loops
//!
//! The ingest loop is the only writer and replaces the whole value on every
//! snapshot; the render loop reads whatever is current when it ticks.

use tokio::sync::watch;
use tokio::time::Instant;

use crate::Snapshot;

use super::color::Color;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorFeed {
    /// One color per host, in snapshot order
    pub colors: Vec<Color>,

    /// When the last snapshot arrived (`lastMetricsAt`), `None` before the
    /// first one
    pub received_at: Option<Instant>,
}

impl ColorFeed {
    pub fn from_snapshot(snapshot: &Snapshot, received_at: Instant) -> Self {
        Self {
            colors: snapshot
                .hosts
                .iter()
                .map(|host| Color::for_cpu_usage(host.cpu_usage))
                .collect(),
            received_at: Some(received_at),
        }
    }
}

pub fn color_feed() -> (watch::Sender<ColorFeed>, watch::Receiver<ColorFeed>) {
    watch::channel(ColorFeed::default())
}
