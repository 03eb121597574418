//! Derived span descriptors.

use core_timeline::TIME_END_OF_SOURCE;

use crate::id::PeriodId;

/// Immutable descriptor of one queued span, derived from the timeline at
/// computation time.
///
/// `end_position_us` uses three states: `None` when the span runs to the
/// end of its period, `Some(TIME_END_OF_SOURCE)` when it is clipped at a
/// postroll boundary, and `Some(t)` for a concrete boundary. When set it
/// always equals the timeline-derived boundary at the time of computation;
/// it is recomputed, never cached, whenever the timeline changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodInfo {
    /// Identity of the span.
    pub id: PeriodId,
    /// Start position within the period, in microseconds.
    pub start_position_us: i64,
    /// For ads: the content position the ad interrupts. For content spans
    /// after an ad: the position the preceding ad interrupted. `None` when
    /// playback starts here naturally.
    pub requested_content_position_us: Option<i64>,
    /// Exclusive end boundary within the period, if the span is clipped.
    pub end_position_us: Option<i64>,
    /// Duration of the span on the period's position axis, if known. For
    /// clipped content spans this equals the end position.
    pub duration_us: Option<i64>,
    /// Whether the following span continues in the same underlying stream
    /// (server-side inserted transition), so no pipeline reset is needed.
    pub is_followed_by_transition_to_same_stream: bool,
    /// Whether this span is the last one of its timeline period.
    pub is_last_in_period: bool,
    /// Whether this span is the last one of its window.
    pub is_last_in_window: bool,
    /// Whether nothing at all follows this span.
    pub is_final: bool,
}

impl PeriodInfo {
    /// Whether the span is clipped at a postroll boundary.
    pub fn ends_at_end_of_source(&self) -> bool {
        self.end_position_us == Some(TIME_END_OF_SOURCE)
    }

    /// Returns a copy with the requested content position replaced.
    ///
    /// Used during reconciliation to keep the originally requested
    /// position instead of one re-derived from defaults.
    pub fn with_requested_content_position_us(mut self, position_us: Option<i64>) -> Self {
        self.requested_content_position_us = position_us;
        self
    }
}
