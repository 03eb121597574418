//! Queue entries.

use crate::info::PeriodInfo;

/// One entry in the period queue: a preparing, prepared or playing span.
///
/// The queue exclusively owns its holders; a holder is dropped when
/// playback advances past it or when a timeline change invalidates it.
/// The `S` parameter is whatever per-span resource bundle the embedder
/// attaches (typically the per-track sample streams); it is dropped with
/// the holder, so stream lifetime can never outlive queue membership.
#[derive(Debug)]
pub struct PeriodHolder<S> {
    /// Descriptor of the span. Replaced (not patched) when the queue
    /// reconciles against a new timeline.
    pub info: PeriodInfo,
    /// Per-span resources attached by the embedder once the span is
    /// prepared.
    pub streams: Option<S>,
    renderer_position_offset_us: i64,
}

impl<S> PeriodHolder<S> {
    pub(crate) fn new(info: PeriodInfo, renderer_position_offset_us: i64) -> Self {
        Self {
            info,
            streams: None,
            renderer_position_offset_us,
        }
    }

    /// Offset mapping this span's period positions onto the single
    /// monotonic renderer axis shared by all queued spans.
    pub fn renderer_offset_us(&self) -> i64 {
        self.renderer_position_offset_us
    }

    /// Maps a position within this span's period onto the renderer axis.
    pub fn to_renderer_time_us(&self, period_time_us: i64) -> i64 {
        period_time_us + self.renderer_position_offset_us
    }

    /// Maps a renderer-axis position back into this span's period.
    pub fn to_period_time_us(&self, renderer_time_us: i64) -> i64 {
        renderer_time_us - self.renderer_position_offset_us
    }

    /// Whether the embedder has attached streams for this span yet.
    pub fn is_prepared(&self) -> bool {
        self.streams.is_some()
    }
}
