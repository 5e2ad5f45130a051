//! Error types shared by the agent, aggregator and client

use thiserror::Error;

/// Result type alias for blinky operations
pub type BlinkyResult<T> = Result<T, BlinkyError>;

/// Errors that can occur anywhere in the pipeline
///
/// Only `SamplingUnavailable` at agent startup is fatal. Everything else is
/// absorbed by the loop that produced it and retried on the next tick.
#[derive(Debug, Error)]
pub enum BlinkyError {
    /// The CPU sampler could not be initialized or did not produce a reading
    #[error("CPU sampling unavailable: {0}")]
    SamplingUnavailable(String),

    /// HTTP connect, read or write failed, or the peer answered with an error
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Malformed JSON or an out-of-range value
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The LED device could not be opened or written to
    #[error("LED device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl BlinkyError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlinkyError::SamplingUnavailable(_))
    }
}

impl From<reqwest::Error> for BlinkyError {
    fn from(err: reqwest::Error) -> Self {
        BlinkyError::TransportFailure(err.to_string())
    }
}

impl From<serde_json::Error> for BlinkyError {
    fn from(err: serde_json::Error) -> Self {
        BlinkyError::ProtocolViolation(err.to_string())
    }
}

#[cfg(feature = "serial")]
impl From<tokio_serial::Error> for BlinkyError {
    fn from(err: tokio_serial::Error) -> Self {
        BlinkyError::DeviceUnavailable(err.to_string())
    }
}
