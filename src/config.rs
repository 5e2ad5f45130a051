use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use tracing::trace;

/// Configuration shared by every role: a name for the default config file
/// location plus a sanity check run after loading.
pub trait RoleConfig: DeserializeOwned + Default + std::fmt::Debug {
    /// File stem under `~/.config/blinky/`
    const ROLE: &'static str;

    fn validate(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    /// Reported host name (default: resolved from the OS)
    pub host_name: Option<String>,

    #[serde(default = "default_sample_period")]
    pub sample_period_ms: u64,

    /// Total timeout of a single POST
    #[serde(default = "default_sample_period")]
    pub post_timeout_ms: u64,
}

impl AgentConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(self.post_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host_name: None,
            sample_period_ms: default_sample_period(),
            post_timeout_ms: default_sample_period(),
        }
    }
}

impl RoleConfig for AgentConfig {
    const ROLE: &'static str = "agent";

    fn validate(&self) -> anyhow::Result<()> {
        non_zero("sample_period_ms", self.sample_period_ms)?;
        non_zero("post_timeout_ms", self.post_timeout_ms)?;
        if self.post_timeout_ms > self.sample_period_ms {
            bail!("post_timeout_ms must not exceed sample_period_ms");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_address")]
    pub address: IpAddr,

    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,

    #[serde(default = "default_broadcast_period")]
    pub broadcast_period_ms: u64,

    #[serde(default = "default_prune_period")]
    pub prune_period_ms: u64,

    /// Hosts silent for longer than this are dropped
    #[serde(default = "default_prune_window")]
    pub prune_window_ms: u64,

    /// Snapshots a subscriber may fall behind before it is disconnected
    #[serde(default = "default_subscriber_backlog")]
    pub subscriber_backlog: usize,

    /// Longest a write to a peer may stay blocked before the connection is
    /// closed
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_ms: u64,
}

impl AggregatorConfig {
    pub fn broadcast_period(&self) -> Duration {
        Duration::from_millis(self.broadcast_period_ms)
    }

    pub fn prune_period(&self) -> Duration {
        Duration::from_millis(self.prune_period_ms)
    }

    pub fn prune_window(&self) -> Duration {
        Duration::from_millis(self.prune_window_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Apply `BLINKY_ADDR` / `BLINKY_PORT` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(addr) = crate::util::get_addr() {
            self.address = addr;
        }
        if let Some(port) = crate::util::get_port() {
            self.port = port;
        }
        self
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: crate::util::get_default_port(),
            broadcast_period_ms: default_broadcast_period(),
            prune_period_ms: default_prune_period(),
            prune_window_ms: default_prune_window(),
            subscriber_backlog: default_subscriber_backlog(),
            flush_timeout_ms: default_flush_timeout(),
        }
    }
}

impl RoleConfig for AggregatorConfig {
    const ROLE: &'static str = "aggregator";

    fn validate(&self) -> anyhow::Result<()> {
        non_zero("broadcast_period_ms", self.broadcast_period_ms)?;
        non_zero("prune_period_ms", self.prune_period_ms)?;
        non_zero("prune_window_ms", self.prune_window_ms)?;
        non_zero("subscriber_backlog", self.subscriber_backlog as u64)?;
        non_zero("flush_timeout_ms", self.flush_timeout_ms)?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_frame_period")]
    pub frame_period_ms: u64,

    /// Age of the last snapshot after which the heartbeat replaces host colors
    #[serde(default = "default_stale_window")]
    pub stale_window_ms: u64,

    /// Age of the last snapshot up to which the aggregator counts as reachable
    #[serde(default = "default_reachable_window")]
    pub reachable_window_ms: u64,

    #[serde(default = "default_status_blink_period")]
    pub status_blink_period_ms: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum silence on an open stream before it is considered dead
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// LED indices known to work on the attached strip, in display order
    #[serde(default = "default_valid_slots")]
    pub valid_slots: Vec<usize>,

    /// Regular expression matched against serial port names
    #[serde(default = "default_port_pattern")]
    pub port_pattern: String,

    #[serde(default = "default_led_count")]
    pub led_count: usize,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl ClientConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }

    pub fn reachable_window(&self) -> Duration {
        Duration::from_millis(self.reachable_window_ms)
    }

    pub fn status_blink_period(&self) -> Duration {
        Duration::from_millis(self.status_blink_period_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: default_frame_period(),
            stale_window_ms: default_stale_window(),
            reachable_window_ms: default_reachable_window(),
            status_blink_period_ms: default_status_blink_period(),
            reconnect_delay_ms: default_reconnect_delay(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            valid_slots: default_valid_slots(),
            port_pattern: default_port_pattern(),
            led_count: default_led_count(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl RoleConfig for ClientConfig {
    const ROLE: &'static str = "client";

    fn validate(&self) -> anyhow::Result<()> {
        non_zero("frame_period_ms", self.frame_period_ms)?;
        non_zero("status_blink_period_ms", self.status_blink_period_ms)?;
        non_zero("reconnect_delay_ms", self.reconnect_delay_ms)?;
        non_zero("read_timeout_ms", self.read_timeout_ms)?;
        non_zero("led_count", self.led_count as u64)?;

        if self.valid_slots.is_empty() {
            bail!("valid_slots must not be empty");
        }
        if let Some(slot) = self.valid_slots.iter().find(|slot| **slot >= self.led_count) {
            bail!("slot {slot} is outside a strip of {} LEDs", self.led_count);
        }

        regex::Regex::new(&self.port_pattern)
            .with_context(|| format!("invalid port_pattern '{}'", self.port_pattern))?;

        Ok(())
    }
}

fn non_zero(name: &str, value: u64) -> anyhow::Result<()> {
    if value == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(())
}

fn default_sample_period() -> u64 {
    500
}

fn default_address() -> IpAddr {
    crate::util::DEFAULT_ADDR
}

fn default_broadcast_period() -> u64 {
    500
}

fn default_prune_period() -> u64 {
    2_000
}

fn default_prune_window() -> u64 {
    5_000
}

fn default_subscriber_backlog() -> usize {
    4
}

/// One backlog worth of broadcast periods
fn default_flush_timeout() -> u64 {
    default_broadcast_period() * default_subscriber_backlog() as u64
}

fn default_frame_period() -> u64 {
    250
}

fn default_stale_window() -> u64 {
    2_000
}

fn default_reachable_window() -> u64 {
    1_000
}

fn default_status_blink_period() -> u64 {
    750
}

fn default_reconnect_delay() -> u64 {
    1_000
}

fn default_connect_timeout() -> u64 {
    1_000
}

fn default_read_timeout() -> u64 {
    2_000
}

fn default_valid_slots() -> Vec<usize> {
    vec![0, 1, 2, 4, 5, 6, 7, 9, 10, 11, 12, 13]
}

fn default_port_pattern() -> String {
    String::from("COM3")
}

fn default_led_count() -> usize {
    60
}

fn default_baud_rate() -> u32 {
    115_200
}

/// `~/.config/blinky/<role>.toml`, if it exists.
pub fn default_config_path<T: RoleConfig>() -> Option<PathBuf> {
    let path = dirs::config_dir()?
        .join("blinky")
        .join(format!("{}.toml", T::ROLE));
    path.exists().then_some(path)
}

pub fn read_config_file<T: RoleConfig>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config.validate()?;
    trace!("loaded config: {config:?}");

    Ok(config)
}

/// Load the explicit config file, else the default location, else defaults.
pub fn load_config<T: RoleConfig>(path: Option<&Path>) -> anyhow::Result<T> {
    match path.map(Path::to_path_buf).or_else(default_config_path::<T>) {
        Some(path) => read_config_file(&path),
        None => Ok(T::default()),
    }
}
