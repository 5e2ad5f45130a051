//! HTTP handlers for the aggregator

use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::header,
    response::{Html, IntoResponse, Response},
};
use tracing::warn;

use super::{
    actor::RegistryHandle,
    error::ApiResult,
    registry::{HostRecord, parse_sample},
    subscribers::SubscriberSet,
};

/// Shared state passed to all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: RegistryHandle,

    pub subscribers: SubscriberSet,
}

impl AppState {
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            subscribers: SubscriberSet::new(),
        }
    }
}

/// GET /
///
/// Human readable summary of registered hosts
pub async fn summary(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let records = state.registry.summary().await?;
    Ok(Html(render_summary(&records, state.subscribers.len())))
}

/// POST /metrics
///
/// Upsert one host sample. A rejected body leaves the registry untouched.
pub async fn submit_metrics(State(state): State<AppState>, body: Bytes) -> ApiResult<&'static str> {
    let sample = parse_sample(&body).inspect_err(|e| warn!("Received bad request: {e}"))?;

    state.registry.upsert(sample).await?;

    Ok("OK\n")
}

/// GET /metrics
///
/// Stream one snapshot per broadcast period as newline-delimited JSON until
/// the peer goes away.
pub async fn stream_metrics(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Response> {
    let snapshots = state.registry.subscribe().await?;
    let subscriber = state.subscribers.register(remote_addr, snapshots);

    // The subscriber lives inside the body stream; hyper drops the stream
    // when a write fails or the connection closes.
    let lines = futures::stream::unfold(subscriber, |mut subscriber| async move {
        let line = subscriber.next_line().await?;
        Some((Ok::<Bytes, Infallible>(line), subscriber))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

pub fn render_summary(records: &[HostRecord], subscribers: usize) -> String {
    let mut html = String::new();

    let _ = writeln!(html, "<h1>Blinky Metrics Server: Online</h1>");
    let _ = writeln!(html, "<p>Registered Hosts: {}</p>", records.len());
    let _ = writeln!(html, "<p>Connected Clients: {subscribers}</p>");
    let _ = writeln!(html, "<ol>");

    for record in records {
        let _ = writeln!(
            html,
            "<li><b>{}</b> (Last Update: {})</li>",
            escape_html(&record.host_name),
            record.last_updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let _ = writeln!(html, "</ol>");

    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
