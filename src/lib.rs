pub mod agent;
pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod util;

use serde::{Deserialize, Serialize};

pub use error::{BlinkyError, BlinkyResult};

/// A single CPU reading for one host, as POSTed by an agent and as carried
/// inside every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetric {
    pub host_name: String,
    pub cpu_usage: f64,
}

/// Health of a link to a peer (aggregator or LED device).
///
/// Loops keep one of these so that each working/broken transition is logged
/// exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    #[default]
    Disconnected,
}

impl LinkState {
    /// Move to `next`, returning `true` if the state actually changed.
    pub fn transition(&mut self, next: LinkState) -> bool {
        let changed = *self != next;
        *self = next;
        changed
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

/// Point-in-time view of every live host, in stable registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub hosts: Vec<HostMetric>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Serialize as one ndjson line, including the trailing newline.
    pub fn to_line(&self) -> BlinkyResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse a single ndjson line. Surrounding whitespace is ignored.
    pub fn from_line(line: &str) -> BlinkyResult<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
