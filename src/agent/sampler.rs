//! CPU sampling for the agent

use sysinfo::System;

use crate::error::{BlinkyError, BlinkyResult};

/// Host name reported when the OS cannot tell us ours
pub const UNKNOWN_HOST: &str = "Unknown";

/// Source of combined CPU utilization readings
pub trait CpuSampler: Send {
    /// Current combined CPU utilization as a fraction in `[0, 1]`
    fn sample(&mut self) -> BlinkyResult<f64>;
}

/// [`CpuSampler`] backed by `sysinfo`
///
/// Utilization is computed by `sysinfo` from the difference between two
/// refreshes, so the first reading after construction measures the time
/// since `new`.
pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    /// Fails with [`BlinkyError::SamplingUnavailable`] on platforms `sysinfo`
    /// cannot read CPU counters on.
    pub fn new() -> BlinkyResult<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(BlinkyError::SamplingUnavailable(
                "platform not supported by sysinfo".to_string(),
            ));
        }

        let mut system = System::new();
        system.refresh_cpu_usage();

        if system.cpus().is_empty() {
            return Err(BlinkyError::SamplingUnavailable(
                "no CPUs reported".to_string(),
            ));
        }

        Ok(Self { system })
    }
}

impl CpuSampler for SysinfoSampler {
    fn sample(&mut self) -> BlinkyResult<f64> {
        self.system.refresh_cpu_usage();

        if self.system.cpus().is_empty() {
            return Err(BlinkyError::SamplingUnavailable(
                "no CPUs reported".to_string(),
            ));
        }

        percent_to_fraction(self.system.global_cpu_usage())
    }
}

/// Convert a `sysinfo` percentage into a fraction clamped to `[0, 1]`.
pub fn percent_to_fraction(percent: f32) -> BlinkyResult<f64> {
    if !percent.is_finite() {
        return Err(BlinkyError::SamplingUnavailable(format!(
            "non-finite CPU usage {percent}"
        )));
    }

    Ok((f64::from(percent) / 100.0).clamp(0.0, 1.0))
}

/// The configured override, else the OS host name, else [`UNKNOWN_HOST`].
pub fn resolve_host_name(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .filter(|name| !name.is_empty())
        .or_else(System::host_name)
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
