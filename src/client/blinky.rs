//! BlinkyTape LED strip over a serial port
//!
//! A frame goes out as three bytes per pixel (R, G, B, each 0..=254)
//! followed by a single `0xFF`, which the tape treats as "latch".

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{BlinkyError, BlinkyResult};

use super::{color::Color, frame::Frame, render::LedStrip};

/// Terminates a frame; never valid as a channel value
pub const FRAME_END: u8 = 0xFF;

/// Largest channel value on the wire
pub const CHANNEL_MAX: u8 = 254;

fn channel_byte(fraction: f64) -> u8 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * f64::from(CHANNEL_MAX)).round() as u8
}

fn push_color(bytes: &mut Vec<u8>, color: Color) {
    bytes.push(channel_byte(color.red));
    bytes.push(channel_byte(color.green));
    bytes.push(channel_byte(color.blue));
}

/// Encode `frame` into the bytes written to the tape.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.len() * 3 + 1);
    for color in frame.pixels() {
        push_color(&mut bytes, *color);
    }
    bytes.push(FRAME_END);
    bytes
}

/// A BlinkyTape on any async byte sink
pub struct BlinkyTape<W> {
    name: String,

    port: W,
}

impl<W> BlinkyTape<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(name: impl Into<String>, port: W) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    pub fn into_inner(self) -> W {
        self.port
    }
}

#[async_trait]
impl<W> LedStrip for BlinkyTape<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn render_frame(&mut self, frame: &Frame) -> BlinkyResult<()> {
        let bytes = encode_frame(frame);

        self.port
            .write_all(&bytes)
            .await
            .map_err(|e| BlinkyError::DeviceUnavailable(format!("{}: {e}", self.name)))?;
        self.port
            .flush()
            .await
            .map_err(|e| BlinkyError::DeviceUnavailable(format!("{}: {e}", self.name)))
    }
}

#[cfg(feature = "serial")]
pub use serial::SerialConnector;

#[cfg(feature = "serial")]
mod serial {
    use async_trait::async_trait;
    use regex::Regex;
    use tokio_serial::SerialPortBuilderExt;
    use tracing::debug;

    use crate::{
        client::render::{LedConnector, LedStrip},
        config::ClientConfig,
        error::{BlinkyError, BlinkyResult},
    };

    use super::BlinkyTape;

    /// Opens the first serial port whose name matches a pattern
    pub struct SerialConnector {
        pattern: Regex,

        baud_rate: u32,
    }

    impl SerialConnector {
        pub fn new(config: &ClientConfig) -> BlinkyResult<Self> {
            let pattern = Regex::new(&config.port_pattern).map_err(|e| {
                BlinkyError::DeviceUnavailable(format!(
                    "invalid port pattern {:?}: {e}",
                    config.port_pattern
                ))
            })?;

            Ok(Self {
                pattern,
                baud_rate: config.baud_rate,
            })
        }

        /// Name of the first available port matching the pattern
        pub fn find_port(&self) -> BlinkyResult<String> {
            let ports = tokio_serial::available_ports()?;
            debug!(
                "serial ports: {:?}",
                ports.iter().map(|p| p.port_name.as_str()).collect::<Vec<_>>()
            );

            ports
                .into_iter()
                .map(|p| p.port_name)
                .find(|name| self.pattern.is_match(name))
                .ok_or_else(|| {
                    BlinkyError::DeviceUnavailable(format!(
                        "no serial port matches {}",
                        self.pattern
                    ))
                })
        }
    }

    #[async_trait]
    impl LedConnector for SerialConnector {
        async fn connect(&self) -> BlinkyResult<Box<dyn LedStrip>> {
            let name = self.find_port()?;
            let port = tokio_serial::new(&name, self.baud_rate).open_native_async()?;
            Ok(Box::new(BlinkyTape::new(name, port)))
        }
    }

}
