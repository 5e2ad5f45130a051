//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blinky_metrics::{
    BlinkyResult, Snapshot,
    agent::{Agent, CpuSampler},
    aggregator::{AggregatorHandle, spawn_aggregator},
    client::{Frame, LedConnector, LedStrip, LineBuffer},
    config::{AgentConfig, AggregatorConfig, ClientConfig},
};
use futures::{StreamExt, stream::BoxStream};
use tokio::task::JoinHandle;

/// Aggregator on a random loopback port with sped up timers
pub fn test_aggregator_config() -> AggregatorConfig {
    AggregatorConfig {
        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        broadcast_period_ms: 50,
        prune_period_ms: 50,
        prune_window_ms: 500,
        subscriber_backlog: 16,
        flush_timeout_ms: 300,
    }
}

pub fn test_agent_config(host_name: &str) -> AgentConfig {
    AgentConfig {
        host_name: Some(host_name.to_string()),
        sample_period_ms: 100,
        post_timeout_ms: 100,
    }
}

pub fn test_client_config() -> ClientConfig {
    ClientConfig {
        frame_period_ms: 20,
        stale_window_ms: 400,
        reachable_window_ms: 200,
        status_blink_period_ms: 100,
        reconnect_delay_ms: 50,
        connect_timeout_ms: 200,
        read_timeout_ms: 300,
        ..ClientConfig::default()
    }
}

pub async fn spawn_test_aggregator() -> AggregatorHandle {
    spawn_aggregator(&test_aggregator_config()).await.unwrap()
}

/// Rebind an aggregator on a port that was used before
pub async fn respawn_aggregator(port: u16) -> AggregatorHandle {
    let config = AggregatorConfig {
        port,
        ..test_aggregator_config()
    };
    spawn_aggregator(&config).await.unwrap()
}

pub fn server_arg(addr: SocketAddr) -> String {
    addr.to_string()
}

/// Always reports the same load
pub struct FixedSampler(pub f64);

impl CpuSampler for FixedSampler {
    fn sample(&mut self) -> BlinkyResult<f64> {
        Ok(self.0)
    }
}

/// Start an agent loop reporting `cpu_usage` as `host_name`
pub fn spawn_agent(addr: SocketAddr, host_name: &str, cpu_usage: f64) -> JoinHandle<()> {
    let agent = Agent::new(
        &server_arg(addr),
        &test_agent_config(host_name),
        FixedSampler(cpu_usage),
    )
    .unwrap();
    tokio::spawn(agent.run())
}

pub async fn post_sample(addr: SocketAddr, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/metrics"))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

pub fn sample_json(host_name: &str, cpu_usage: f64) -> String {
    serde_json::json!({ "hostName": host_name, "cpuUsage": cpu_usage }).to_string()
}

pub async fn summary_html(addr: SocketAddr) -> String {
    reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

/// Fetch the summary page until it contains `needle` or `timeout` passes.
pub async fn summary_eventually_contains(addr: SocketAddr, needle: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if summary_html(addr).await.contains(needle) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A subscriber on `GET /metrics`, reading one snapshot at a time
pub struct SnapshotReader {
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,

    lines: LineBuffer,

    queued: VecDeque<String>,
}

impl SnapshotReader {
    pub async fn connect(addr: SocketAddr) -> Self {
        let response = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .unwrap()
            .error_for_status()
            .unwrap();

        Self {
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            lines: LineBuffer::new(),
            queued: VecDeque::new(),
        }
    }

    /// Next snapshot, or `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Snapshot> {
        loop {
            if let Some(line) = self.queued.pop_front() {
                return Some(Snapshot::from_line(&line).unwrap());
            }

            let chunk = tokio::time::timeout(Duration::from_secs(2), self.stream.next())
                .await
                .expect("no snapshot within 2s")?
                .ok()?;
            self.queued.extend(self.lines.push(&chunk).unwrap());
        }
    }

    /// Skip snapshots until one satisfies `predicate`.
    pub async fn until(&mut self, predicate: impl Fn(&Snapshot) -> bool) -> Snapshot {
        loop {
            let snapshot = self.next().await.expect("stream ended");
            if predicate(&snapshot) {
                return snapshot;
            }
        }
    }
}

pub fn host_names(snapshot: &Snapshot) -> Vec<&str> {
    snapshot.hosts.iter().map(|h| h.host_name.as_str()).collect()
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// In-memory LED strip recording every frame it is sent
#[derive(Clone, Default)]
pub struct FrameRecorder {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl FrameRecorder {
    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn latest(&self) -> Option<Frame> {
        self.frames.lock().unwrap().last().cloned()
    }

    /// Frames recorded after the first `skip`
    pub fn since(&self, skip: usize) -> Vec<Frame> {
        self.frames.lock().unwrap().iter().skip(skip).cloned().collect()
    }
}

struct RecordingStrip(FrameRecorder);

#[async_trait]
impl LedStrip for RecordingStrip {
    fn name(&self) -> &str {
        "memory"
    }

    async fn render_frame(&mut self, frame: &Frame) -> BlinkyResult<()> {
        self.0.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[async_trait]
impl LedConnector for FrameRecorder {
    async fn connect(&self) -> BlinkyResult<Box<dyn LedStrip>> {
        Ok(Box::new(RecordingStrip(self.clone())))
    }
}
