//! Integration tests for the aggregator's HTTP surface
//!
//! These tests verify that:
//! - Accepted samples show up in the snapshot stream
//! - Rejected samples leave the registry untouched
//! - Silent hosts are pruned
//! - The last of several rapid updates wins
//! - The summary page reflects hosts and connected clients
//! - A subscriber that stops reading is disconnected

use std::time::Duration;

use blinky_metrics::{aggregator::spawn_aggregator, config::AggregatorConfig};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpSocket;

use crate::helpers::*;

#[tokio::test]
async fn test_sample_is_streamed_to_subscriber() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    let mut reader = SnapshotReader::connect(addr).await;

    let response = post_sample(addr, &sample_json("h1", 0.4)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK\n");

    let snapshot = reader.until(|s| !s.is_empty()).await;
    assert_eq!(host_names(&snapshot), vec!["h1"]);
    assert_eq!(snapshot.hosts[0].cpu_usage, 0.4);

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_snapshots_keep_flowing() {
    let aggregator = spawn_test_aggregator().await;
    let mut reader = SnapshotReader::connect(aggregator.local_addr()).await;

    for _ in 0..3 {
        let snapshot = reader.next().await.unwrap();
        assert!(snapshot.is_empty());
    }

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_post_keeps_previous_value() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    post_sample(addr, &sample_json("h1", 0.3)).await;

    let response = post_sample(addr, r#"{"hostName":"h1"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut reader = SnapshotReader::connect(addr).await;
    let snapshot = reader.next().await.unwrap();
    assert_eq!(host_names(&snapshot), vec!["h1"]);
    assert_eq!(snapshot.hosts[0].cpu_usage, 0.3);

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_bodies_are_rejected() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    for body in [
        "not json",
        r#"{"cpuUsage":0.5}"#,
        r#"{"hostName":"","cpuUsage":0.5}"#,
        r#"{"hostName":"h1","cpuUsage":"high"}"#,
        r#"{"hostName":"h1","cpuUsage":1.5}"#,
        r#"{"hostName":"h1","cpuUsage":-0.1}"#,
    ] {
        let response = post_sample(addr, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    assert!(aggregator.registry().snapshot().await.unwrap().is_empty());

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_last_writer_wins_on_burst() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    post_sample(addr, &sample_json("h1", 0.2)).await;
    post_sample(addr, &sample_json("h1", 0.9)).await;

    let mut reader = SnapshotReader::connect(addr).await;
    let snapshot = reader.next().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.hosts[0].cpu_usage, 0.9);

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_host_is_pruned() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    // register in a known order before the agents race each other
    for (name, cpu) in [("h1", 0.1), ("h2", 0.2), ("h3", 0.3)] {
        post_sample(addr, &sample_json(name, cpu)).await;
    }

    let h1 = spawn_agent(addr, "h1", 0.1);
    let h2 = spawn_agent(addr, "h2", 0.2);
    let h3 = spawn_agent(addr, "h3", 0.3);

    let mut reader = SnapshotReader::connect(addr).await;
    let snapshot = reader.until(|s| s.len() == 3).await;
    assert_eq!(host_names(&snapshot), vec!["h1", "h2", "h3"]);

    h2.abort();

    let snapshot = reader.until(|s| s.len() == 2).await;
    assert_eq!(host_names(&snapshot), vec!["h1", "h3"]);

    h1.abort();
    h3.abort();
    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_returning_host_is_appended() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    post_sample(addr, &sample_json("a", 0.1)).await;
    let b = spawn_agent(addr, "b", 0.2);

    // let "a" expire while "b" keeps reporting
    let registry = aggregator.registry();
    let mut remaining = 20;
    while registry.snapshot().await.unwrap().len() != 1 && remaining > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        remaining -= 1;
    }

    post_sample(addr, &sample_json("a", 0.1)).await;

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(host_names(&snapshot), vec!["b", "a"]);

    b.abort();
    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_summary_page() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    post_sample(addr, &sample_json("web-1", 0.5)).await;
    post_sample(addr, &sample_json("db-1", 0.5)).await;

    let mut reader = SnapshotReader::connect(addr).await;
    reader.next().await.unwrap();

    let html = summary_html(addr).await;

    assert!(html.contains("Blinky Metrics Server: Online"));
    assert!(html.contains("Registered Hosts: 2"));
    assert!(html.contains("Connected Clients: 1"));
    assert!(html.find("web-1").unwrap() < html.find("db-1").unwrap());

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let aggregator = spawn_test_aggregator().await;
    let mut reader = SnapshotReader::connect(aggregator.local_addr()).await;
    reader.next().await.unwrap();

    aggregator.shutdown().await.unwrap();

    while reader.next().await.is_some() {}
}

#[tokio::test]
async fn test_subscriber_that_stops_reading_is_dropped() {
    let config = AggregatorConfig {
        broadcast_period_ms: 20,
        prune_window_ms: 60_000,
        flush_timeout_ms: 1_000,
        ..test_aggregator_config()
    };
    let aggregator = spawn_aggregator(&config).await.unwrap();
    let addr = aggregator.local_addr();

    // long host names make every snapshot large, so the socket buffers fill
    let padding = "x".repeat(200);
    for i in 0..300 {
        post_sample(addr, &sample_json(&format!("host-{i:03}-{padding}"), 0.5)).await;
    }

    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(4096).unwrap();
    let mut stream = socket.connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: blinky\r\n\r\n")
        .await
        .unwrap();

    assert!(summary_eventually_contains(addr, "Connected Clients: 1", Duration::from_secs(2)).await);

    // never read from `stream`
    assert!(summary_eventually_contains(addr, "Connected Clients: 0", Duration::from_secs(10)).await);

    drop(stream);
    aggregator.shutdown().await.unwrap();
}
