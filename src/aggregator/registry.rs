//! Liveness-windowed map of host name to latest CPU reading
//!
//! `HostRegistry` is plain data: it is owned by exactly one task (the
//! registry actor), so every upsert, prune and snapshot is applied in a
//! single total order without locking.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tracing::info;

use crate::{
    HostMetric, Snapshot,
    error::{BlinkyError, BlinkyResult},
};

/// Latest state known for one host
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub host_name: String,

    pub cpu_usage: f64,

    /// Monotonic time of the last sample, used for pruning
    pub last_updated: Instant,

    /// Wall clock time of the last sample, for display only
    pub last_updated_at: DateTime<Utc>,

    /// Registration order; snapshots are sorted by this
    sequence: u64,
}

#[derive(Debug)]
pub struct HostRegistry {
    hosts: HashMap<String, HostRecord>,

    next_sequence: u64,

    prune_window: Duration,
}

impl HostRegistry {
    pub fn new(prune_window: Duration) -> Self {
        Self {
            hosts: HashMap::new(),
            next_sequence: 0,
            prune_window,
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, host_name: &str) -> Option<&HostRecord> {
        self.hosts.get(host_name)
    }

    /// Record a sample, registering the host if it is new.
    ///
    /// Returns `true` if the host was not registered before. A host that
    /// already expired but was not pruned yet counts as new and moves to the
    /// end of the order.
    pub fn upsert(&mut self, sample: HostMetric, now: Instant) -> bool {
        let expired = self
            .hosts
            .get(&sample.host_name)
            .is_some_and(|record| self.is_expired(record, now));
        if expired {
            self.hosts.remove(&sample.host_name);
        }

        if let Some(record) = self.hosts.get_mut(&sample.host_name) {
            record.cpu_usage = sample.cpu_usage;
            record.last_updated = now;
            record.last_updated_at = Utc::now();
            return false;
        }

        info!("Registering new host: {}", sample.host_name);

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.hosts.insert(
            sample.host_name.clone(),
            HostRecord {
                host_name: sample.host_name,
                cpu_usage: sample.cpu_usage,
                last_updated: now,
                last_updated_at: Utc::now(),
                sequence,
            },
        );

        true
    }

    /// Drop every host silent for longer than the prune window.
    pub fn prune(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .hosts
            .values()
            .filter(|record| self.is_expired(record, now))
            .map(|record| record.host_name.clone())
            .collect();

        for host_name in &expired {
            info!("Removing inactive host: {host_name}");
            self.hosts.remove(host_name);
        }

        expired
    }

    /// Live hosts in registration order.
    ///
    /// Hosts past the prune window are left out even if the pruner has not
    /// run yet.
    pub fn snapshot(&self, now: Instant) -> Snapshot {
        Snapshot {
            hosts: self
                .records()
                .into_iter()
                .filter(|record| !self.is_expired(record, now))
                .map(|record| HostMetric {
                    host_name: record.host_name.clone(),
                    cpu_usage: record.cpu_usage,
                })
                .collect(),
        }
    }

    /// Every registered host in registration order.
    pub fn records(&self) -> Vec<&HostRecord> {
        let mut records: Vec<&HostRecord> = self.hosts.values().collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    fn is_expired(&self, record: &HostRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.last_updated) > self.prune_window
    }
}

/// Parse and validate the body of `POST /metrics`.
///
/// Requires a non-empty string `hostName` and a numeric `cpuUsage` within
/// `[0, 1]`. The number is kept exactly as parsed.
pub fn parse_sample(body: &[u8]) -> BlinkyResult<HostMetric> {
    let value: Value = serde_json::from_slice(body)?;

    let host_name = match value.get("hostName") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) => return Err(violation("hostName is empty")),
        Some(_) => return Err(violation("hostName is not a string")),
        None => return Err(violation("missing hostName")),
    };

    let cpu_usage = match value.get("cpuUsage") {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| violation("cpuUsage is not representable as a double"))?,
        Some(_) => return Err(violation("cpuUsage is not a number")),
        None => return Err(violation("missing cpuUsage")),
    };

    if !(0.0..=1.0).contains(&cpu_usage) {
        return Err(BlinkyError::ProtocolViolation(format!(
            "cpuUsage {cpu_usage} is outside [0, 1]"
        )));
    }

    Ok(HostMetric {
        host_name,
        cpu_usage,
    })
}

fn violation(reason: &str) -> BlinkyError {
    BlinkyError::ProtocolViolation(reason.to_string())
}
