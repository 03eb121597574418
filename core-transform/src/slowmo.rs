//! # Slow-Motion Flattening
//!
//! Content recorded at a high capture rate can carry slow-motion segment
//! tags: stretches that are meant to play back slowed down. Flattening
//! bakes that intent into the output so the tags can be dropped.
//!
//! Two cooperating pieces implement it:
//!
//! - [`SlowMotionTimeMap`] remaps input timestamps onto the flattened
//!   output axis (tagged stretches take `speed_divisor` times longer).
//! - [`SlowMotionFlattener`] additionally thins frames outside the tagged
//!   stretches, where the high capture rate would otherwise play back as
//!   fast motion. Sync samples are never dropped.

use crate::buffer::SampleBuffer;
use crate::format::{Format, SlowMotionSegment};

/// Piecewise-linear mapping from input timestamps to flattened output
/// timestamps.
#[derive(Debug, Clone)]
pub struct SlowMotionTimeMap {
    segments: Vec<SlowMotionSegment>,
}

impl SlowMotionTimeMap {
    /// Builds the map from a stream's tagged segments.
    pub fn new(segments: &[SlowMotionSegment]) -> Self {
        let mut segments = segments.to_vec();
        segments.sort_by_key(|segment| segment.start_us);
        Self { segments }
    }

    /// Maps an input timestamp onto the output axis.
    pub fn map_us(&self, time_us: i64) -> i64 {
        let mut stretched = 0i64;
        for segment in &self.segments {
            if time_us <= segment.start_us {
                break;
            }
            let covered = time_us.min(segment.end_us) - segment.start_us;
            stretched += covered * (i64::from(segment.speed_divisor) - 1);
        }
        time_us + stretched
    }
}

/// Per-sample drop/re-stamp decision for video flattening.
#[derive(Debug)]
pub struct SlowMotionFlattener {
    time_map: SlowMotionTimeMap,
    segments: Vec<SlowMotionSegment>,
    /// Outside tagged segments, keep one frame in `keep_every` to bring
    /// the high capture rate back down to normal speed.
    keep_every: u32,
    frame_counter: u32,
}

impl SlowMotionFlattener {
    /// Creates a flattener for a slow-motion-tagged stream.
    pub fn new(format: &Format) -> Self {
        let keep_every = format
            .slow_motion_segments
            .iter()
            .map(|segment| segment.speed_divisor)
            .max()
            .unwrap_or(1)
            .max(1);
        Self {
            time_map: SlowMotionTimeMap::new(&format.slow_motion_segments),
            segments: format.slow_motion_segments.clone(),
            keep_every,
            frame_counter: 0,
        }
    }

    /// Decides the fate of one sample: `true` means drop it without
    /// forwarding; otherwise its timestamp has been re-stamped in place.
    pub fn drop_or_transform(&mut self, buffer: &mut SampleBuffer) -> bool {
        let inside_segment = self
            .segments
            .iter()
            .any(|segment| buffer.time_us >= segment.start_us && buffer.time_us < segment.end_us);
        if !inside_segment {
            let index = self.frame_counter;
            self.frame_counter = self.frame_counter.wrapping_add(1);
            if index % self.keep_every != 0 && !buffer.is_key_frame {
                return true;
            }
        }
        buffer.time_us = self.time_map.map_us(buffer.time_us);
        false
    }
}
