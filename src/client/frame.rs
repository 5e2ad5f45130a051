//! Frame composition for the LED strip

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ClientConfig;

use super::{color::Color, feed::ColorFeed};

/// Slot used for the status heartbeat
pub const STATUS_SLOT: usize = 0;

/// One full frame for the strip, one color per LED
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Vec<Color>,
}

impl Frame {
    /// A frame with every LED off
    pub fn new(led_count: usize) -> Self {
        Self {
            pixels: vec![Color::OFF; led_count],
        }
    }

    /// Set one LED. Slots past the end of the strip are ignored.
    pub fn set(&mut self, slot: usize, color: Color) -> bool {
        match self.pixels.get_mut(slot) {
            Some(pixel) => {
                *pixel = color;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, slot: usize) -> Option<Color> {
        self.pixels.get(slot).copied()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Indices of every LED that is not off
    pub fn lit_slots(&self) -> Vec<usize> {
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, color)| !color.is_off())
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// Turns the current [`ColorFeed`] into a frame
#[derive(Debug, Clone)]
pub struct FrameComposer {
    valid_slots: Vec<usize>,

    led_count: usize,

    stale_window: Duration,

    reachable_window: Duration,

    blink_period: Duration,

    /// Reference point for the heartbeat phase
    started_at: Instant,
}

impl FrameComposer {
    pub fn new(config: &ClientConfig, started_at: Instant) -> Self {
        Self {
            valid_slots: config.valid_slots.clone(),
            led_count: config.led_count,
            stale_window: config.stale_window(),
            reachable_window: config.reachable_window(),
            blink_period: config.status_blink_period(),
            started_at,
        }
    }

    /// Build the frame to show at `now`.
    ///
    /// Fresh, non-empty data maps host `i` onto `valid_slots[i]`; hosts
    /// beyond the last valid slot are not shown. Otherwise only the
    /// heartbeat on slot 0 blinks: green while snapshots keep arriving, red
    /// once the aggregator looks unreachable.
    pub fn compose(&self, feed: &ColorFeed, now: Instant) -> Frame {
        let mut frame = Frame::new(self.led_count);

        let age = feed
            .received_at
            .map(|received_at| now.saturating_duration_since(received_at));
        let stale = age.is_none_or(|age| age > self.stale_window);

        if stale || feed.colors.is_empty() {
            if self.heartbeat_on(now) {
                let reachable = age.is_some_and(|age| age <= self.reachable_window);
                let color = if reachable { Color::GREEN } else { Color::RED };
                frame.set(STATUS_SLOT, color);
            }
            return frame;
        }

        for (slot, color) in self.valid_slots.iter().zip(&feed.colors) {
            frame.set(*slot, *color);
        }

        frame
    }

    /// Alternates every blink period, starting lit.
    fn heartbeat_on(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.started_at).as_millis();
        let period = self.blink_period.as_millis().max(1);
        (elapsed / period) % 2 == 0
    }
}
