//! Integration tests for agents reporting to a live aggregator

use std::time::Duration;

use blinky_metrics::{LinkState, agent::Agent};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_agent_registers_with_aggregator() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    let mut agent = Agent::new(&server_arg(addr), &test_agent_config("h1"), FixedSampler(0.4)).unwrap();
    agent.tick().await.unwrap();
    assert_eq!(agent.link(), LinkState::Connected);

    let snapshot = aggregator.registry().snapshot().await.unwrap();
    assert_eq!(host_names(&snapshot), vec!["h1"]);
    assert_eq!(snapshot.hosts[0].cpu_usage, 0.4);

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_agent_survives_aggregator_restart() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    let mut agent = Agent::new(&server_arg(addr), &test_agent_config("h1"), FixedSampler(0.7)).unwrap();
    agent.tick().await.unwrap();

    aggregator.shutdown().await.unwrap();

    assert!(agent.tick().await.is_err());
    assert_eq!(agent.link(), LinkState::Disconnected);

    let aggregator = respawn_aggregator(addr.port()).await;

    agent.tick().await.unwrap();
    assert_eq!(agent.link(), LinkState::Connected);

    let snapshot = aggregator.registry().snapshot().await.unwrap();
    assert_eq!(host_names(&snapshot), vec!["h1"]);

    aggregator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_many_agents_keep_registration_order() {
    let aggregator = spawn_test_aggregator().await;
    let addr = aggregator.local_addr();

    let mut agents = Vec::new();
    for name in ["alpha", "bravo", "charlie", "delta"] {
        let mut agent = Agent::new(&server_arg(addr), &test_agent_config(name), FixedSampler(0.5)).unwrap();
        agent.tick().await.unwrap();
        agents.push(agent);
    }

    // a few more rounds in reverse must not reorder anything
    for _ in 0..3 {
        for agent in agents.iter_mut().rev() {
            agent.tick().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let snapshot = aggregator.registry().snapshot().await.unwrap();
    assert_eq!(host_names(&snapshot), vec!["alpha", "bravo", "charlie", "delta"]);

    aggregator.shutdown().await.unwrap();
}
