//! Agent loop - samples CPU and POSTs it to the aggregator
//!
//! ```text
//! Timer tick → Sample CPU → POST /metrics → track link state
//! ```
//!
//! Neither sampling nor transport failures stop the loop; the next tick
//! simply tries again.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    HostMetric, LinkState,
    config::AgentConfig,
    error::{BlinkyError, BlinkyResult},
    util::metrics_url,
};

use super::sampler::{CpuSampler, resolve_host_name};

pub struct Agent<S: CpuSampler> {
    /// Aggregator endpoint
    url: String,

    host_name: String,

    /// HTTP client with a total timeout of at most one sample period
    client: reqwest::Client,

    sampler: S,

    sample_period: Duration,

    link: LinkState,

    /// Whether the previous sample succeeded, so failures are logged once
    sampling_ok: bool,
}

impl<S: CpuSampler> Agent<S> {
    pub fn new(server: &str, config: &AgentConfig, sampler: S) -> BlinkyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.post_timeout())
            .build()?;

        Ok(Self {
            url: metrics_url(server),
            host_name: resolve_host_name(config.host_name.as_deref()),
            client,
            sampler,
            sample_period: config.sample_period(),
            link: LinkState::Disconnected,
            sampling_ok: true,
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    /// Run forever, one sample per period.
    #[instrument(skip(self), fields(host = %self.host_name))]
    pub async fn run(mut self) {
        info!("reporting to {} every {:?}", self.url, self.sample_period);

        let mut ticker = interval(self.sample_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let _ = self.tick().await;
        }
    }

    /// Take one sample and report it, updating the link state.
    pub async fn tick(&mut self) -> BlinkyResult<()> {
        let sample = HostMetric {
            host_name: self.host_name.clone(),
            cpu_usage: self.next_cpu_usage(),
        };

        let result = self.report(&sample).await;

        match &result {
            Ok(()) => {
                if self.link.transition(LinkState::Connected) {
                    info!("Successfully connected to {}", self.url);
                }
            }
            Err(e) => {
                if self.link.transition(LinkState::Disconnected) {
                    warn!("Attempting to reconnect to {} due to: {e}", self.url);
                } else {
                    debug!("{}: still disconnected: {e}", self.url);
                }
            }
        }

        result
    }

    fn next_cpu_usage(&mut self) -> f64 {
        match self.sampler.sample() {
            Ok(usage) => {
                if !self.sampling_ok {
                    info!("CPU sampling recovered");
                    self.sampling_ok = true;
                }
                usage
            }
            Err(e) => {
                if self.sampling_ok {
                    warn!("CPU sampling failed, reporting 0.0: {e}");
                    self.sampling_ok = false;
                }
                0.0
            }
        }
    }

    async fn report(&self, sample: &HostMetric) -> BlinkyResult<()> {
        trace!("{}: posting {sample:?}", self.url);

        let response = self.client.post(&self.url).json(sample).send().await?;

        if !response.status().is_success() {
            return Err(BlinkyError::TransportFailure(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        Ok(())
    }
}
