//! # Timeline
//!
//! An ordered sequence of windows, each composed of one or more periods.
//!
//! A [`Timeline`] is an immutable snapshot: content changes (manifest
//! refreshes, ad loads, duration revisions) produce a new timeline value
//! that replaces the old one wholesale. Consumers that cache positions
//! derived from a timeline must re-derive them when a new version arrives.

use serde::{Deserialize, Serialize};

use crate::ad_state::AdPlaybackState;

/// Opaque identifier of a period occurrence within a timeline.
///
/// Uids are structural: two timeline versions describing the same content
/// use the same uids, which is what lets the queue reconcile its holders
/// across timeline changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodUid(pub String);

impl PeriodUid {
    /// Returns the uid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeriodUid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for PeriodUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One contiguous playable segment of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePeriod {
    /// Unique identifier of this period occurrence.
    pub uid: PeriodUid,
    /// Duration in microseconds, if known.
    pub duration_us: Option<i64>,
    /// Ad insertion metadata for this period.
    pub ads: AdPlaybackState,
}

impl TimelinePeriod {
    /// Creates a period without ads.
    pub fn new(uid: impl Into<PeriodUid>, duration_us: Option<i64>) -> Self {
        Self {
            uid: uid.into(),
            duration_us,
            ads: AdPlaybackState::none(),
        }
    }

    /// Replaces the ad playback state.
    pub fn with_ads(mut self, ads: AdPlaybackState) -> Self {
        self.ads = ads;
        self
    }
}

/// A seekable unit of content composed of one or more periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineWindow {
    /// Human-readable identifier, used only for diagnostics.
    pub id: String,
    /// Whether the window supports seeking.
    pub is_seekable: bool,
    /// Whether the window may still grow (live content).
    pub is_dynamic: bool,
    /// Default playback start position within the window.
    pub default_position_us: i64,
    /// The periods spanned by this window, in order.
    pub periods: Vec<TimelinePeriod>,
}

impl TimelineWindow {
    /// Creates an on-demand window over the given periods.
    pub fn new(id: impl Into<String>, periods: Vec<TimelinePeriod>) -> Self {
        Self {
            id: id.into(),
            is_seekable: true,
            is_dynamic: false,
            default_position_us: 0,
            periods,
        }
    }

    /// Marks the window as dynamic (live).
    pub fn with_dynamic(mut self, is_dynamic: bool) -> Self {
        self.is_dynamic = is_dynamic;
        self
    }

    /// Sets the default start position.
    pub fn with_default_position_us(mut self, position_us: i64) -> Self {
        self.default_position_us = position_us;
        self
    }
}

/// Ordered windows over ordered periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    windows: Vec<TimelineWindow>,
}

impl Timeline {
    /// An empty timeline.
    pub fn empty() -> Self {
        Self { windows: Vec::new() }
    }

    /// Creates a timeline from windows.
    pub fn new(windows: Vec<TimelineWindow>) -> Self {
        Self { windows }
    }

    /// Convenience constructor: one seekable window over one period.
    pub fn single_period(uid: impl Into<PeriodUid>, duration_us: i64) -> Self {
        let uid = uid.into();
        let id = uid.as_str().to_owned();
        Self::new(vec![TimelineWindow::new(
            id,
            vec![TimelinePeriod {
                uid,
                duration_us: Some(duration_us),
                ads: AdPlaybackState::none(),
            }],
        )])
    }

    /// Returns a copy of this timeline with the ad playback state of the
    /// period identified by `uid` replaced.
    ///
    /// # Panics
    ///
    /// Panics if no period has the given uid.
    pub fn with_ad_playback_state(mut self, uid: &PeriodUid, ads: AdPlaybackState) -> Self {
        let period = self
            .windows
            .iter_mut()
            .flat_map(|window| window.periods.iter_mut())
            .find(|period| &period.uid == uid)
            .expect("unknown period uid");
        period.ads = ads;
        self
    }

    /// Whether the timeline has no periods.
    pub fn is_empty(&self) -> bool {
        self.period_count() == 0
    }

    /// Number of windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Total number of periods across all windows.
    pub fn period_count(&self) -> usize {
        self.windows.iter().map(|window| window.periods.len()).sum()
    }

    /// The window at `window_index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn window(&self, window_index: usize) -> &TimelineWindow {
        &self.windows[window_index]
    }

    /// The period at the flattened `period_index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn period(&self, period_index: usize) -> &TimelinePeriod {
        let (window_index, index_in_window) = self.locate(period_index).expect("period index");
        &self.windows[window_index].periods[index_in_window]
    }

    /// Flattened index of the period with the given uid, if present.
    pub fn index_of_period(&self, uid: &PeriodUid) -> Option<usize> {
        self.periods().position(|period| &period.uid == uid)
    }

    /// The period with the given uid, if present.
    pub fn period_by_uid(&self, uid: &PeriodUid) -> Option<&TimelinePeriod> {
        self.periods().find(|period| &period.uid == uid)
    }

    /// Index of the window containing the period at `period_index`.
    pub fn window_index_of_period(&self, period_index: usize) -> Option<usize> {
        self.locate(period_index).map(|(window_index, _)| window_index)
    }

    /// Index of the period after `period_index`, or `None` at the end of
    /// the timeline.
    pub fn next_period_index(&self, period_index: usize) -> Option<usize> {
        let next = period_index + 1;
        (next < self.period_count()).then_some(next)
    }

    /// Whether the period at `period_index` is the last period of its
    /// window.
    pub fn is_last_in_window(&self, period_index: usize) -> bool {
        match self.locate(period_index) {
            Some((window_index, index_in_window)) => {
                index_in_window + 1 == self.windows[window_index].periods.len()
            }
            None => false,
        }
    }

    /// Whether the period at `period_index` starts its window.
    pub fn is_first_in_window(&self, period_index: usize) -> bool {
        matches!(self.locate(period_index), Some((_, 0)))
    }

    /// Whether the window at `window_index` is the final window.
    pub fn is_last_window(&self, window_index: usize) -> bool {
        window_index + 1 == self.windows.len()
    }

    fn periods(&self) -> impl Iterator<Item = &TimelinePeriod> {
        self.windows.iter().flat_map(|window| window.periods.iter())
    }

    fn locate(&self, period_index: usize) -> Option<(usize, usize)> {
        let mut remaining = period_index;
        for (window_index, window) in self.windows.iter().enumerate() {
            if remaining < window.periods.len() {
                return Some((window_index, remaining));
            }
            remaining -= window.periods.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::secs_to_us;

    fn two_window_timeline() -> Timeline {
        Timeline::new(vec![
            TimelineWindow::new(
                "first",
                vec![
                    TimelinePeriod {
                        uid: "w0p0".into(),
                        duration_us: Some(secs_to_us(30)),
                        ads: AdPlaybackState::none(),
                    },
                    TimelinePeriod {
                        uid: "w0p1".into(),
                        duration_us: Some(secs_to_us(30)),
                        ads: AdPlaybackState::none(),
                    },
                ],
            ),
            TimelineWindow::new(
                "second",
                vec![TimelinePeriod {
                    uid: "w1p0".into(),
                    duration_us: Some(secs_to_us(10)),
                    ads: AdPlaybackState::none(),
                }],
            ),
        ])
    }

    #[test]
    fn flattened_period_indexing() {
        let timeline = two_window_timeline();
        assert_eq!(timeline.period_count(), 3);
        assert_eq!(timeline.period(0).uid.as_str(), "w0p0");
        assert_eq!(timeline.period(2).uid.as_str(), "w1p0");
        assert_eq!(timeline.index_of_period(&"w0p1".into()), Some(1));
        assert_eq!(timeline.index_of_period(&"missing".into()), None);
    }

    #[test]
    fn window_boundaries() {
        let timeline = two_window_timeline();
        assert!(!timeline.is_last_in_window(0));
        assert!(timeline.is_last_in_window(1));
        assert!(timeline.is_last_in_window(2));
        assert!(timeline.is_first_in_window(2));
        assert_eq!(timeline.window_index_of_period(1), Some(0));
        assert_eq!(timeline.window_index_of_period(2), Some(1));
        assert!(!timeline.is_last_window(0));
        assert!(timeline.is_last_window(1));
    }

    #[test]
    fn next_period_stops_at_end() {
        let timeline = two_window_timeline();
        assert_eq!(timeline.next_period_index(0), Some(1));
        assert_eq!(timeline.next_period_index(2), None);
    }

    #[test]
    fn ad_state_replacement_is_wholesale() {
        let uid: PeriodUid = "solo".into();
        let timeline = Timeline::single_period(uid.clone(), secs_to_us(30));
        let ads = AdPlaybackState::new(uuid::Uuid::new_v4(), &[0])
            .with_content_duration_us(secs_to_us(30));
        let updated = timeline.clone().with_ad_playback_state(&uid, ads.clone());
        assert_eq!(timeline.period(0).ads, AdPlaybackState::none());
        assert_eq!(updated.period(0).ads, ads);
    }
}
