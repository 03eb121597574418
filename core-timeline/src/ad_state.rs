//! # Ad Playback State
//!
//! Per-period description of where ads are inserted and how far each ad has
//! progressed through its lifecycle.
//!
//! An [`AdPlaybackState`] is an immutable value. Every state transition is
//! expressed as a `with_*` method returning an updated copy, so a new
//! timeline version can be published atomically when an ad loads, errors or
//! finishes playing.
//!
//! ## Invariants
//!
//! - Ad groups are ordered by time; the postroll sentinel
//!   [`TIME_END_OF_SOURCE`](crate::time::TIME_END_OF_SOURCE) sorts last.
//! - Per-ad state moves monotonically from unavailable/available to
//!   played, skipped or errored; there is no way back except
//!   [`AdPlaybackState::with_reset_ad_group`].
//! - A fully played (or fully errored) group never again interrupts
//!   content: the position queries below skip it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::TIME_END_OF_SOURCE;

/// Lifecycle state of a single ad within an ad group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdState {
    /// The ad is expected but its media is not yet known.
    Unavailable,
    /// The ad media is loaded and ready to play.
    Available,
    /// The ad was deliberately skipped.
    Skipped,
    /// The ad played to completion.
    Played,
    /// Loading or playing the ad failed.
    Error,
}

impl AdState {
    /// Whether this ad still needs to be played.
    pub fn is_playable(self) -> bool {
        matches!(self, AdState::Unavailable | AdState::Available)
    }
}

/// One group of ads at a single position in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdGroup {
    /// Position of the group in the period, or
    /// [`TIME_END_OF_SOURCE`](crate::time::TIME_END_OF_SOURCE) for a
    /// postroll.
    pub time_us: i64,
    /// Number of ads in the group, if known yet.
    pub count: Option<usize>,
    /// Per-ad lifecycle state. Empty until the count is known.
    pub states: Vec<AdState>,
    /// Per-ad media locations. Entries are filled in as ads load.
    pub uris: Vec<Option<String>>,
    /// Per-ad durations in microseconds, where known.
    pub durations_us: Vec<Option<i64>>,
    /// Offset added to the content position at which playback resumes
    /// after this group.
    pub content_resume_offset_us: i64,
    /// Whether the group is spliced into the same underlying stream
    /// (server-side insertion) rather than loaded out-of-band.
    pub is_server_side_inserted: bool,
}

impl AdGroup {
    fn new(time_us: i64) -> Self {
        Self {
            time_us,
            count: None,
            states: Vec::new(),
            uris: Vec::new(),
            durations_us: Vec::new(),
            content_resume_offset_us: 0,
            is_server_side_inserted: false,
        }
    }

    /// Index of the first ad that still needs playing, or `count` when the
    /// whole group is done. While the count is unknown this is 0.
    pub fn first_ad_index_to_play(&self) -> usize {
        self.next_ad_index_to_play(None)
    }

    /// Index of the next ad to play after `last_played_index`, skipping
    /// played, skipped and errored ads.
    pub fn next_ad_index_to_play(&self, last_played_index: Option<usize>) -> usize {
        let mut next = last_played_index.map_or(0, |i| i + 1);
        while next < self.states.len() && !self.states[next].is_playable() {
            next += 1;
        }
        next
    }

    /// Whether the group still has ads that should interrupt content.
    pub fn has_unplayed_ads(&self) -> bool {
        match self.count {
            None => true,
            Some(count) => self.first_ad_index_to_play() < count,
        }
    }

    /// Whether the ad at `ad_index` has loaded media.
    pub fn is_ad_available(&self, ad_index: usize) -> bool {
        self.states.get(ad_index) == Some(&AdState::Available)
    }

    /// Sum of the known per-ad durations.
    pub fn total_duration_us(&self) -> Option<i64> {
        if self.durations_us.is_empty() || self.durations_us.iter().any(Option::is_none) {
            return None;
        }
        Some(self.durations_us.iter().flatten().sum())
    }
}

/// Ad insertion metadata for one period.
///
/// Group positions are fixed at construction; everything else is updated
/// via `with_*` methods as the ad source reports progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPlaybackState {
    /// Identifier of the ad source that produced this state.
    pub ads_id: Option<Uuid>,
    groups: Vec<AdGroup>,
    /// Duration of the underlying content, if known.
    pub content_duration_us: Option<i64>,
}

impl AdPlaybackState {
    /// State with no ad groups.
    pub fn none() -> Self {
        Self {
            ads_id: None,
            groups: Vec::new(),
            content_duration_us: None,
        }
    }

    /// Creates a state with one empty group per entry of `group_times_us`.
    ///
    /// # Panics
    ///
    /// Panics if the group times are not sorted ascending with any
    /// [`TIME_END_OF_SOURCE`](crate::time::TIME_END_OF_SOURCE) postroll
    /// last.
    pub fn new(ads_id: Uuid, group_times_us: &[i64]) -> Self {
        for pair in group_times_us.windows(2) {
            let ordered = match (pair[0], pair[1]) {
                (_, TIME_END_OF_SOURCE) => true,
                (TIME_END_OF_SOURCE, _) => false,
                (a, b) => a <= b,
            };
            assert!(ordered, "ad group times must be sorted ascending");
        }
        Self {
            ads_id: Some(ads_id),
            groups: group_times_us.iter().map(|&t| AdGroup::new(t)).collect(),
            content_duration_us: None,
        }
    }

    /// Number of ad groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The ad group at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn group(&self, index: usize) -> &AdGroup {
        &self.groups[index]
    }

    /// All ad groups in time order.
    pub fn groups(&self) -> &[AdGroup] {
        &self.groups
    }

    fn with_group(mut self, index: usize, update: impl FnOnce(&mut AdGroup)) -> Self {
        update(&mut self.groups[index]);
        self
    }

    /// Sets the content duration.
    pub fn with_content_duration_us(mut self, content_duration_us: i64) -> Self {
        self.content_duration_us = Some(content_duration_us);
        self
    }

    /// Sets the number of ads in a group, sizing the per-ad vectors.
    ///
    /// # Panics
    ///
    /// Panics if the count shrinks below the previously known count.
    pub fn with_ad_count(self, group_index: usize, count: usize) -> Self {
        self.with_group(group_index, |group| {
            assert!(
                group.count.map_or(true, |previous| count >= previous),
                "ad count may not shrink"
            );
            group.count = Some(count);
            group.states.resize(count, AdState::Unavailable);
            group.uris.resize(count, None);
            group.durations_us.resize(count, None);
        })
    }

    /// Records the media location of an ad, marking it available.
    pub fn with_ad_uri(self, group_index: usize, ad_index: usize, uri: impl Into<String>) -> Self {
        self.with_group(group_index, |group| {
            group.uris[ad_index] = Some(uri.into());
            if group.states[ad_index] == AdState::Unavailable {
                group.states[ad_index] = AdState::Available;
            }
        })
    }

    /// Sets the duration of one ad.
    pub fn with_ad_duration_us(self, group_index: usize, ad_index: usize, duration_us: i64) -> Self {
        self.with_group(group_index, |group| {
            group.durations_us[ad_index] = Some(duration_us);
        })
    }

    /// Marks an ad as played.
    pub fn with_played_ad(self, group_index: usize, ad_index: usize) -> Self {
        self.with_group(group_index, |group| {
            group.states[ad_index] = AdState::Played;
        })
    }

    /// Marks an ad as skipped.
    pub fn with_skipped_ad(self, group_index: usize, ad_index: usize) -> Self {
        self.with_group(group_index, |group| {
            group.states[ad_index] = AdState::Skipped;
        })
    }

    /// Marks an ad as failed to load. Errored ads are skipped by the
    /// position queries exactly as if they had played.
    pub fn with_ad_load_error(self, group_index: usize, ad_index: usize) -> Self {
        self.with_group(group_index, |group| {
            group.states[ad_index] = AdState::Error;
        })
    }

    /// Sets the content resume offset of a group.
    pub fn with_content_resume_offset_us(self, group_index: usize, offset_us: i64) -> Self {
        self.with_group(group_index, |group| {
            group.content_resume_offset_us = offset_us;
        })
    }

    /// Flags a group as server-side inserted.
    pub fn with_is_server_side_inserted(self, group_index: usize, inserted: bool) -> Self {
        self.with_group(group_index, |group| {
            group.is_server_side_inserted = inserted;
        })
    }

    /// Resets a group to its initial unloaded state, keeping its position.
    pub fn with_reset_ad_group(self, group_index: usize) -> Self {
        self.with_group(group_index, |group| {
            let time_us = group.time_us;
            *group = AdGroup::new(time_us);
        })
    }

    /// Index of the ad group at or before `position_us` that still has ads
    /// to play before content at that position may continue, if any.
    ///
    /// `period_duration_us` is needed to decide whether a postroll group
    /// lies at or before the position.
    pub fn ad_group_index_for_position_us(
        &self,
        position_us: i64,
        period_duration_us: Option<i64>,
    ) -> Option<usize> {
        if self.groups.is_empty() {
            return None;
        }
        // Linear scan from the back: group times need not be strictly
        // increasing once the postroll sentinel is involved.
        let mut index = self.groups.len();
        while index > 0
            && self.is_position_before_group(position_us, period_duration_us, index - 1)
        {
            index -= 1;
        }
        if index == 0 {
            return None;
        }
        let index = index - 1;
        self.groups[index].has_unplayed_ads().then_some(index)
    }

    /// Index of the next ad group strictly after `position_us` that still
    /// has ads to play, if any.
    pub fn ad_group_index_after_position_us(
        &self,
        position_us: i64,
        period_duration_us: Option<i64>,
    ) -> Option<usize> {
        if position_us == TIME_END_OF_SOURCE {
            return None;
        }
        if let Some(duration_us) = period_duration_us {
            if position_us >= duration_us {
                return None;
            }
        }
        self.groups.iter().position(|group| {
            let after_position =
                group.time_us == TIME_END_OF_SOURCE || group.time_us > position_us;
            after_position && group.has_unplayed_ads()
        })
    }

    fn is_position_before_group(
        &self,
        position_us: i64,
        period_duration_us: Option<i64>,
        group_index: usize,
    ) -> bool {
        if position_us == TIME_END_OF_SOURCE {
            return false;
        }
        let group_time_us = self.groups[group_index].time_us;
        if group_time_us == TIME_END_OF_SOURCE {
            period_duration_us.map_or(false, |duration| position_us < duration)
        } else {
            position_us < group_time_us
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::secs_to_us;

    fn state(times: &[i64]) -> AdPlaybackState {
        AdPlaybackState::new(Uuid::new_v4(), times).with_content_duration_us(secs_to_us(30))
    }

    fn loaded(state: AdPlaybackState, group: usize) -> AdPlaybackState {
        state
            .with_ad_count(group, 1)
            .with_ad_uri(group, 0, "https://ads.example/creative.mp4")
            .with_ad_duration_us(group, 0, secs_to_us(10))
    }

    #[test]
    fn group_times_must_be_sorted() {
        // Postroll last is fine.
        let _ = state(&[0, secs_to_us(10), TIME_END_OF_SOURCE]);
        let result = std::panic::catch_unwind(|| {
            AdPlaybackState::new(Uuid::new_v4(), &[secs_to_us(10), 0])
        });
        assert!(result.is_err());
    }

    #[test]
    fn unknown_count_group_counts_as_unplayed() {
        let state = state(&[secs_to_us(10)]);
        assert!(state.group(0).has_unplayed_ads());
        assert_eq!(state.group(0).first_ad_index_to_play(), 0);
        assert_eq!(
            state.ad_group_index_after_position_us(0, Some(secs_to_us(30))),
            Some(0)
        );
    }

    #[test]
    fn played_group_is_skipped_by_queries() {
        let state = loaded(state(&[secs_to_us(10), secs_to_us(20)]), 0)
            .with_played_ad(0, 0);
        assert!(!state.group(0).has_unplayed_ads());
        assert_eq!(
            state.ad_group_index_after_position_us(0, Some(secs_to_us(30))),
            Some(1)
        );
        assert_eq!(
            state.ad_group_index_for_position_us(secs_to_us(10), Some(secs_to_us(30))),
            None
        );
    }

    #[test]
    fn errored_group_is_skipped_like_played() {
        let state = state(&[secs_to_us(10)])
            .with_ad_count(0, 1)
            .with_ad_load_error(0, 0);
        assert!(!state.group(0).has_unplayed_ads());
        assert_eq!(
            state.ad_group_index_after_position_us(0, Some(secs_to_us(30))),
            None
        );
    }

    #[test]
    fn preroll_resolves_at_position_zero() {
        let state = loaded(state(&[0]), 0);
        assert_eq!(
            state.ad_group_index_for_position_us(0, Some(secs_to_us(30))),
            Some(0)
        );
    }

    #[test]
    fn postroll_resolves_for_positions_inside_content() {
        let state = loaded(state(&[TIME_END_OF_SOURCE]), 0);
        // Mid-content positions are before the postroll group.
        assert_eq!(
            state.ad_group_index_for_position_us(secs_to_us(15), Some(secs_to_us(30))),
            None
        );
        assert_eq!(
            state.ad_group_index_after_position_us(secs_to_us(15), Some(secs_to_us(30))),
            Some(0)
        );
        // A position at the content duration has reached the postroll.
        assert_eq!(
            state.ad_group_index_for_position_us(secs_to_us(30), Some(secs_to_us(30))),
            Some(0)
        );
    }

    #[test]
    fn multi_ad_group_advances_past_finished_ads() {
        let state = state(&[secs_to_us(10)])
            .with_ad_count(0, 3)
            .with_ad_uri(0, 0, "a")
            .with_ad_uri(0, 1, "b")
            .with_played_ad(0, 0)
            .with_skipped_ad(0, 1);
        assert_eq!(state.group(0).first_ad_index_to_play(), 2);
        assert_eq!(state.group(0).next_ad_index_to_play(Some(0)), 2);
        assert!(state.group(0).has_unplayed_ads());
    }

    #[test]
    fn total_duration_requires_all_ads_known() {
        let partial = state(&[0]).with_ad_count(0, 2).with_ad_duration_us(0, 0, 5);
        assert_eq!(partial.group(0).total_duration_us(), None);
        let full = partial.with_ad_duration_us(0, 1, 7);
        assert_eq!(full.group(0).total_duration_us(), Some(12));
    }

    #[test]
    fn reset_ad_group_clears_everything_but_position() {
        let state = loaded(state(&[secs_to_us(10)]), 0)
            .with_played_ad(0, 0)
            .with_reset_ad_group(0);
        let group = state.group(0);
        assert_eq!(group.time_us, secs_to_us(10));
        assert_eq!(group.count, None);
        assert!(group.has_unplayed_ads());
    }

    #[test]
    fn ad_count_may_not_shrink() {
        let state = state(&[0]).with_ad_count(0, 2);
        let result = std::panic::catch_unwind(|| state.with_ad_count(0, 1));
        assert!(result.is_err());
    }
}
