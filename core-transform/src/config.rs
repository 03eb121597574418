//! # Engine Configuration
//!
//! Tunables for the transform engine loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transform engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many spans to keep queued ahead of the reading span.
    ///
    /// Default: 3 (the playing span plus two spans of lookahead).
    #[serde(default = "default_lookahead_spans")]
    pub lookahead_spans: usize,

    /// Capacity of the bounded channel carrying codec completion signals
    /// into the engine loop.
    ///
    /// Default: 64.
    #[serde(default = "default_codec_event_capacity")]
    pub codec_event_capacity: usize,

    /// How long the loop sleeps when no renderer made progress and no
    /// codec event arrived.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_idle_tick")]
    pub idle_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_spans: default_lookahead_spans(),
            codec_event_capacity: default_codec_event_capacity(),
            idle_tick: default_idle_tick(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.lookahead_spans == 0 {
            return Err("lookahead_spans must be at least 1".into());
        }
        if self.codec_event_capacity == 0 {
            return Err("codec_event_capacity must be at least 1".into());
        }
        if self.idle_tick.is_zero() {
            return Err("idle_tick must be non-zero".into());
        }
        Ok(())
    }
}

fn default_lookahead_spans() -> usize {
    3
}

fn default_codec_event_capacity() -> usize {
    64
}

fn default_idle_tick() -> Duration {
    Duration::from_millis(10)
}
