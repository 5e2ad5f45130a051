//! Host agent
//!
//! Samples combined CPU utilization every sample period and POSTs it to the
//! aggregator as `{"hostName": ..., "cpuUsage": ...}`.

pub mod reporter;
pub mod sampler;

pub use reporter::Agent;
pub use sampler::{CpuSampler, SysinfoSampler};
