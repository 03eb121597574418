//! # Period Queue
//!
//! The ordered chain of spans from the playing span through the loading
//! span, plus the span-computation logic that consults the timeline's ad
//! metadata to decide what comes next.
//!
//! ## Pointers
//!
//! Three pointers move through the chain, always in this order:
//!
//! ```text
//! playing ≤ reading ≤ loading
//! ```
//!
//! - *playing*: the span whose output the downstream consumer is on.
//! - *reading*: the span whose samples are currently being drained into
//!   the renderers.
//! - *loading*: the tail; the span most recently enqueued.
//!
//! The chain is stored in a deque owned exclusively by the queue. The
//! playing span is the front, the loading span is the back, and the
//! reading pointer is an offset from the front. Holders are dropped when
//! the playing pointer advances past them or when reconciliation
//! invalidates them; they never escape the queue.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use core_timeline::{PeriodUid, Timeline, TimelinePeriod, TIME_END_OF_SOURCE};

use crate::holder::PeriodHolder;
use crate::id::PeriodId;
use crate::info::PeriodInfo;

/// Offset of the first span on the renderer position axis.
///
/// Starting well above zero keeps renderer positions positive even when a
/// span starts at a large period position and the next span starts at
/// zero.
pub const INITIAL_RENDERER_POSITION_OFFSET_US: i64 = 1_000_000_000_000;

/// Where playback starts when the queue is empty: the resolved first span
/// id plus the requested position within it.
#[derive(Debug, Clone)]
pub struct PlaybackStart {
    /// Id of the first span, as resolved by
    /// [`PeriodQueue::resolve_period_id_for_ads`].
    pub period_id: PeriodId,
    /// Start position within the period, in microseconds.
    pub position_us: i64,
    /// The originally requested content position, when the start was
    /// redirected into an ad.
    pub requested_content_position_us: Option<i64>,
}

/// The ordered chain of period holders and the span-computation logic.
///
/// The queue never stores a timeline. Every operation that consults
/// content structure takes the current [`Timeline`] as an argument, so a
/// timeline change only takes effect when the caller explicitly
/// reconciles via [`PeriodQueue::update_queued_periods`].
#[derive(Debug)]
pub struct PeriodQueue<S = ()> {
    holders: VecDeque<PeriodHolder<S>>,
    reading_offset: usize,
    window_sequences: HashMap<PeriodUid, u64>,
    next_window_sequence: u64,
}

impl<S> Default for PeriodQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PeriodQueue<S> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            holders: VecDeque::new(),
            reading_offset: 0,
            window_sequences: HashMap::new(),
            next_window_sequence: 0,
        }
    }

    /// Number of queued spans.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether the queue has no spans.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// The playing span, if any.
    pub fn playing(&self) -> Option<&PeriodHolder<S>> {
        self.holders.front()
    }

    /// The reading span, if any.
    pub fn reading(&self) -> Option<&PeriodHolder<S>> {
        self.holders.get(self.reading_offset)
    }

    /// Mutable access to the reading span, if any.
    pub fn reading_mut(&mut self) -> Option<&mut PeriodHolder<S>> {
        self.holders.get_mut(self.reading_offset)
    }

    /// The loading span (the tail), if any.
    pub fn loading(&self) -> Option<&PeriodHolder<S>> {
        self.holders.back()
    }

    /// Mutable access to the loading span, if any.
    pub fn loading_mut(&mut self) -> Option<&mut PeriodHolder<S>> {
        self.holders.back_mut()
    }

    /// Whether the reading pointer is at the tail.
    pub fn reading_is_loading(&self) -> bool {
        !self.holders.is_empty() && self.reading_offset + 1 == self.holders.len()
    }

    /// Whether the reading pointer is still on the playing span.
    pub fn playing_is_reading(&self) -> bool {
        self.reading_offset == 0
    }

    /// Drops every holder and resets the pointers. Window sequence
    /// numbering is preserved so re-resolved ids stay stable.
    pub fn clear(&mut self) {
        debug!(dropped = self.holders.len(), "clearing period queue");
        self.holders.clear();
        self.reading_offset = 0;
    }

    /// Computes the descriptor of the span that should be enqueued next.
    ///
    /// With an empty queue this derives the first span from `start`;
    /// otherwise it derives the follower of the loading span. Returns
    /// `None` once the loading span is final (nothing left to load), or
    /// when the follower would be a later ad of a multi-ad group whose
    /// media has not loaded yet. The first ad of a group is offered even
    /// before it loads, with its duration unset.
    ///
    /// Calling this repeatedly without enqueueing returns identical
    /// results.
    pub fn next_period_info(
        &mut self,
        timeline: &Timeline,
        renderer_position_us: i64,
        start: &PlaybackStart,
    ) -> Option<PeriodInfo> {
        match self.holders.back() {
            None => self.period_info_for_id(
                timeline,
                start.period_id.clone(),
                start.requested_content_position_us,
                start.position_us,
            ),
            Some(loading) => {
                let prev_info = loading.info.clone();
                let prev_offset = loading.renderer_offset_us();
                self.following_period_info(timeline, &prev_info, prev_offset, renderer_position_us)
            }
        }
    }

    /// Appends a holder for `info` at the loading end and returns it so
    /// the embedder can attach streams.
    ///
    /// # Panics
    ///
    /// Panics if a span with the same id is already queued, or if the
    /// current loading span's duration is still unknown (its renderer
    /// offset cannot be extended yet).
    pub fn enqueue_period(&mut self, info: PeriodInfo) -> &mut PeriodHolder<S> {
        assert!(
            self.holders.iter().all(|holder| holder.info.id != info.id),
            "span {:?} is already queued",
            info.id
        );
        let renderer_offset_us = match self.holders.back() {
            None => INITIAL_RENDERER_POSITION_OFFSET_US,
            Some(loading) => {
                let loading_duration_us = loading
                    .info
                    .duration_us
                    .expect("cannot enqueue after a span whose duration is unknown");
                loading.renderer_offset_us() + loading_duration_us - info.start_position_us
            }
        };
        debug!(id = ?info.id, renderer_offset_us, "enqueueing span");
        self.holders.push_back(PeriodHolder::new(info, renderer_offset_us));
        self.holders.back_mut().expect("just pushed")
    }

    /// Advances the playing pointer one span forward, dropping and
    /// returning the old playing holder.
    ///
    /// # Panics
    ///
    /// Panics if there is no span to advance into: advancing the playing
    /// pointer past the loading span is a contract violation by the
    /// caller.
    pub fn advance_playing_period(&mut self) -> PeriodHolder<S> {
        assert!(
            self.holders.len() > 1,
            "cannot advance the playing period past the loading period"
        );
        let holder = self.holders.pop_front().expect("non-empty");
        self.reading_offset = self.reading_offset.saturating_sub(1);
        debug!(id = ?holder.info.id, "advanced playing period");
        holder
    }

    /// Advances the reading pointer one span forward and returns the new
    /// reading holder.
    ///
    /// # Panics
    ///
    /// Panics if the reading pointer is already at the loading span.
    pub fn advance_reading_period(&mut self) -> &PeriodHolder<S> {
        assert!(
            self.reading_offset + 1 < self.holders.len(),
            "cannot advance the reading period past the loading period"
        );
        self.reading_offset += 1;
        let holder = &self.holders[self.reading_offset];
        debug!(id = ?holder.info.id, "advanced reading period");
        holder
    }

    /// Reconciles the queued spans against a changed timeline.
    ///
    /// Every holder's descriptor is recomputed from `timeline`. Holders
    /// whose identity or start position no longer match are dropped along
    /// with everything after them. When a kept holder's duration changed,
    /// all later holders are dropped too (their offsets depend on the
    /// changed boundary) and the return value reports whether the change
    /// was absorbed:
    ///
    /// - `true`: the change is entirely behind what the renderers have
    ///   read (`max_renderer_read_position_us`, on the renderer axis), or
    ///   the boundary is a same-stream transition; playback continues.
    /// - `false`: renderers have already read at or past the new boundary
    ///   of the reading span, or the reading span itself was dropped. The
    ///   caller must perform a seek/reset; this is an expected outcome,
    ///   not an error.
    ///
    /// Pass [`TIME_END_OF_SOURCE`] as `max_renderer_read_position_us` if
    /// the renderers have read to the end of the reading span.
    pub fn update_queued_periods(
        &mut self,
        timeline: &Timeline,
        renderer_position_us: i64,
        max_renderer_read_position_us: i64,
    ) -> bool {
        let mut index = 0;
        while index < self.holders.len() {
            let old_info = self.holders[index].info.clone();
            let new_info = if index == 0 {
                // The id and start position of the playing span are the
                // caller's responsibility (position discontinuities are
                // resolved before reconciliation); refresh the derived
                // fields only.
                match self.updated_period_info(timeline, &old_info) {
                    Some(info) => info,
                    None => {
                        // Playing period vanished from the timeline.
                        self.remove_from(1);
                        return false;
                    }
                }
            } else {
                let prev_info = self.holders[index - 1].info.clone();
                let prev_offset = self.holders[index - 1].renderer_offset_us();
                match self.following_period_info(
                    timeline,
                    &prev_info,
                    prev_offset,
                    renderer_position_us,
                ) {
                    Some(info) if Self::can_keep(&old_info, &info) => info,
                    // The follower changed identity or is no longer in the
                    // timeline: this holder and everything after it are
                    // stale.
                    _ => {
                        let removed_reading = self.remove_from(index);
                        return !removed_reading;
                    }
                }
            };
            let new_info =
                new_info.with_requested_content_position_us(old_info.requested_content_position_us);
            self.holders[index].info = new_info.clone();

            if !Self::durations_compatible(old_info.duration_us, new_info.duration_us) {
                debug!(
                    id = ?new_info.id,
                    old = ?old_info.duration_us,
                    new = ?new_info.duration_us,
                    "span duration changed"
                );
                let holder = &self.holders[index];
                let new_duration_renderer_time_us =
                    new_info.duration_us.map(|d| holder.to_renderer_time_us(d));
                let is_reading = index == self.reading_offset;
                let reading_read_beyond_new_duration = is_reading
                    && !holder.info.is_followed_by_transition_to_same_stream
                    && (max_renderer_read_position_us == TIME_END_OF_SOURCE
                        || new_duration_renderer_time_us
                            .map_or(false, |t| max_renderer_read_position_us >= t));
                let removed_reading = self.remove_from(index + 1);
                return !removed_reading && !reading_read_beyond_new_duration;
            }
            index += 1;
        }
        true
    }

    /// Maps a (period, position) pair to the id that should be active
    /// there: the enclosing unplayed ad group's first playable ad, or the
    /// content span covering the position.
    ///
    /// # Panics
    ///
    /// Panics if the period uid is not part of `timeline`.
    pub fn resolve_period_id_for_ads(
        &mut self,
        timeline: &Timeline,
        period_uid: &PeriodUid,
        position_us: i64,
    ) -> PeriodId {
        let window_sequence = self.window_sequence_for(period_uid);
        self.resolve_id_in_period(timeline, period_uid, position_us, window_sequence)
    }

    // ------------------------------------------------------------------
    // Span computation
    // ------------------------------------------------------------------

    fn resolve_id_in_period(
        &self,
        timeline: &Timeline,
        period_uid: &PeriodUid,
        position_us: i64,
        window_sequence: u64,
    ) -> PeriodId {
        let period = timeline
            .period_by_uid(period_uid)
            .expect("period uid not present in timeline");
        match period
            .ads
            .ad_group_index_for_position_us(position_us, period.duration_us)
        {
            Some(group_index) => PeriodId::for_ad(
                period_uid.clone(),
                group_index,
                period.ads.group(group_index).first_ad_index_to_play(),
                window_sequence,
            ),
            None => PeriodId::for_content(
                period_uid.clone(),
                window_sequence,
                period
                    .ads
                    .ad_group_index_after_position_us(position_us, period.duration_us),
            ),
        }
    }

    fn period_info_for_id(
        &self,
        timeline: &Timeline,
        id: PeriodId,
        requested_content_position_us: Option<i64>,
        start_position_us: i64,
    ) -> Option<PeriodInfo> {
        match id.ad {
            Some(ad) => self.period_info_for_ad(
                timeline,
                &id.period_uid,
                ad.ad_group_index,
                ad.ad_index_in_ad_group,
                requested_content_position_us,
                id.window_sequence,
            ),
            None => self.period_info_for_content(
                timeline,
                &id.period_uid,
                start_position_us,
                requested_content_position_us,
                id.window_sequence,
            ),
        }
    }

    /// Computes the span following `prev_info`, or `None` when nothing
    /// follows yet (final span reached, or the next ad group's count is
    /// still unknown after an ad).
    fn following_period_info(
        &mut self,
        timeline: &Timeline,
        prev_info: &PeriodInfo,
        _prev_renderer_offset_us: i64,
        _renderer_position_us: i64,
    ) -> Option<PeriodInfo> {
        if prev_info.is_last_in_period {
            return self.first_info_of_next_period(timeline, prev_info);
        }

        let period_uid = prev_info.id.period_uid.clone();
        let period = timeline.period_by_uid(&period_uid)?;

        if let Some(ad) = prev_info.id.ad {
            let group = period.ads.group(ad.ad_group_index);
            let count = group.count?;
            let next_ad_index = group.next_ad_index_to_play(Some(ad.ad_index_in_ad_group));
            if next_ad_index < count {
                // More ads in this group: the next one plays once loaded.
                if !group.is_ad_available(next_ad_index) {
                    return None;
                }
                return self.period_info_for_ad(
                    timeline,
                    &period_uid,
                    ad.ad_group_index,
                    next_ad_index,
                    prev_info.requested_content_position_us,
                    prev_info.id.window_sequence,
                );
            }
            // Resume content after the group.
            let requested_us = prev_info.requested_content_position_us;
            let start_position_us = match requested_us {
                Some(position) => position,
                // Transitioning out of an ad that started playback: fall
                // back to the window's default start position.
                None => self.default_content_position_us(timeline, &period_uid)?,
            };
            let min_start_us = Self::min_start_position_after_ad_group_us(period, ad.ad_group_index);
            return self.period_info_for_content(
                timeline,
                &period_uid,
                start_position_us.max(min_start_us),
                requested_us,
                prev_info.id.window_sequence,
            );
        }

        // Content span ending at an ad group.
        let next_group_index = prev_info
            .id
            .next_ad_group_index
            .expect("non-final content span must name its ending ad group");
        let group = period.ads.group(next_group_index);
        let first_ad_index = group.first_ad_index_to_play();
        if Some(first_ad_index) == group.count {
            // Every ad in the group played, was skipped or errored:
            // deliberately fall through to the content after the boundary.
            let start_position_us =
                Self::min_start_position_after_ad_group_us(period, next_group_index);
            return self.period_info_for_content(
                timeline,
                &period_uid,
                start_position_us,
                prev_info.duration_us,
                prev_info.id.window_sequence,
            );
        }
        self.period_info_for_ad(
            timeline,
            &period_uid,
            next_group_index,
            first_ad_index,
            prev_info.duration_us,
            prev_info.id.window_sequence,
        )
    }

    fn first_info_of_next_period(
        &mut self,
        timeline: &Timeline,
        prev_info: &PeriodInfo,
    ) -> Option<PeriodInfo> {
        let current_index = timeline.index_of_period(&prev_info.id.period_uid)?;
        let next_index = timeline.next_period_index(current_index)?;
        let next_uid = timeline.period(next_index).uid.clone();

        let (start_position_us, requested_content_position_us, window_sequence) =
            if timeline.is_first_in_window(next_index) {
                // A new window starts buffering from its default position.
                let window_index = timeline.window_index_of_period(next_index)?;
                let default_us = timeline.window(window_index).default_position_us;
                (default_us, None, self.window_sequence_for(&next_uid))
            } else {
                // A new period within the same window continues seamlessly.
                (0, Some(0), prev_info.id.window_sequence)
            };

        let id =
            self.resolve_id_in_period(timeline, &next_uid, start_position_us, window_sequence);
        self.period_info_for_id(
            timeline,
            id,
            requested_content_position_us,
            start_position_us,
        )
    }

    fn period_info_for_ad(
        &self,
        timeline: &Timeline,
        period_uid: &PeriodUid,
        ad_group_index: usize,
        ad_index_in_ad_group: usize,
        content_position_us: Option<i64>,
        window_sequence: u64,
    ) -> Option<PeriodInfo> {
        let period = timeline.period_by_uid(period_uid)?;
        let group = period.ads.group(ad_group_index);
        let duration_us = group
            .durations_us
            .get(ad_index_in_ad_group)
            .copied()
            .flatten();
        Some(PeriodInfo {
            id: PeriodId::for_ad(
                period_uid.clone(),
                ad_group_index,
                ad_index_in_ad_group,
                window_sequence,
            ),
            start_position_us: 0,
            requested_content_position_us: content_position_us,
            end_position_us: None,
            duration_us,
            is_followed_by_transition_to_same_stream: group.is_server_side_inserted,
            is_last_in_period: false,
            is_last_in_window: false,
            is_final: false,
        })
    }

    fn period_info_for_content(
        &self,
        timeline: &Timeline,
        period_uid: &PeriodUid,
        start_position_us: i64,
        requested_content_position_us: Option<i64>,
        window_sequence: u64,
    ) -> Option<PeriodInfo> {
        let period = timeline.period_by_uid(period_uid)?;
        let next_ad_group_index = period
            .ads
            .ad_group_index_after_position_us(start_position_us, period.duration_us);
        let id = PeriodId::for_content(period_uid.clone(), window_sequence, next_ad_group_index);

        let period_index = timeline.index_of_period(period_uid)?;
        let is_last_in_period = next_ad_group_index.is_none();
        let is_last_in_window = is_last_in_period && timeline.is_last_in_window(period_index);
        let is_final = is_last_in_window && {
            let window_index = timeline.window_index_of_period(period_index)?;
            timeline.is_last_window(window_index) && !timeline.window(window_index).is_dynamic
        };

        let end_position_us =
            next_ad_group_index.map(|group| period.ads.group(group).time_us);
        let duration_us = match end_position_us {
            Some(TIME_END_OF_SOURCE) | None => period.duration_us,
            Some(end) => Some(end),
        };
        // The start must stay inside the span even when an ad boundary sits
        // at (or past) the period's end.
        let mut start_position_us = start_position_us;
        if let Some(duration) = duration_us {
            if start_position_us >= duration {
                start_position_us = (duration - 1).max(0);
            }
        }
        let is_followed_by_transition_to_same_stream = next_ad_group_index
            .map_or(false, |group| period.ads.group(group).is_server_side_inserted);

        Some(PeriodInfo {
            id,
            start_position_us,
            requested_content_position_us,
            end_position_us,
            duration_us,
            is_followed_by_transition_to_same_stream,
            is_last_in_period,
            is_last_in_window,
            is_final,
        })
    }

    /// Recomputes the timeline-derived fields of `info`, keeping its id
    /// and positions. Returns `None` when the period left the timeline.
    fn updated_period_info(&self, timeline: &Timeline, info: &PeriodInfo) -> Option<PeriodInfo> {
        let id = &info.id;
        let period = timeline.period_by_uid(&id.period_uid)?;
        let period_index = timeline.index_of_period(&id.period_uid)?;

        let is_last_in_period = !id.is_ad() && id.next_ad_group_index.is_none();
        let is_last_in_window = is_last_in_period && timeline.is_last_in_window(period_index);
        let is_final = is_last_in_window && {
            let window_index = timeline.window_index_of_period(period_index)?;
            timeline.is_last_window(window_index) && !timeline.window(window_index).is_dynamic
        };

        let (end_position_us, duration_us, is_followed_by_transition_to_same_stream) =
            match id.ad {
                Some(ad) => {
                    let group = period.ads.group(ad.ad_group_index);
                    let duration = group
                        .durations_us
                        .get(ad.ad_index_in_ad_group)
                        .copied()
                        .flatten();
                    (None, duration, group.is_server_side_inserted)
                }
                None => {
                    let end = id
                        .next_ad_group_index
                        .map(|group| period.ads.group(group).time_us);
                    let duration = match end {
                        Some(TIME_END_OF_SOURCE) | None => period.duration_us,
                        Some(boundary) => Some(boundary),
                    };
                    let same_stream = id
                        .next_ad_group_index
                        .map_or(false, |group| period.ads.group(group).is_server_side_inserted);
                    (end, duration, same_stream)
                }
            };

        Some(PeriodInfo {
            id: id.clone(),
            start_position_us: info.start_position_us,
            requested_content_position_us: info.requested_content_position_us,
            end_position_us,
            duration_us,
            is_followed_by_transition_to_same_stream,
            is_last_in_period,
            is_last_in_window,
            is_final,
        })
    }

    fn default_content_position_us(
        &self,
        timeline: &Timeline,
        period_uid: &PeriodUid,
    ) -> Option<i64> {
        let period_index = timeline.index_of_period(period_uid)?;
        let window_index = timeline.window_index_of_period(period_index)?;
        Some(timeline.window(window_index).default_position_us.max(0))
    }

    fn min_start_position_after_ad_group_us(
        period: &TimelinePeriod,
        ad_group_index: usize,
    ) -> i64 {
        let group = period.ads.group(ad_group_index);
        if group.time_us == TIME_END_OF_SOURCE {
            period.duration_us.unwrap_or(0)
        } else {
            group.time_us + group.content_resume_offset_us
        }
    }

    fn can_keep(old_info: &PeriodInfo, new_info: &PeriodInfo) -> bool {
        old_info.id == new_info.id && old_info.start_position_us == new_info.start_position_us
    }

    fn durations_compatible(old_us: Option<i64>, new_us: Option<i64>) -> bool {
        old_us.is_none() || old_us == new_us
    }

    /// Drops every holder at or after `index`. Returns whether the
    /// reading holder was among the dropped.
    fn remove_from(&mut self, index: usize) -> bool {
        debug_assert!(index >= 1, "the playing span is never removed here");
        let removed_reading = self.reading_offset >= index;
        if index < self.holders.len() {
            debug!(dropped = self.holders.len() - index, "truncating period queue");
        }
        self.holders.truncate(index);
        if removed_reading {
            // The reading pointer falls back to the new loading span.
            self.reading_offset = self.holders.len() - 1;
        }
        removed_reading
    }

    fn window_sequence_for(&mut self, period_uid: &PeriodUid) -> u64 {
        if let Some(&sequence) = self.window_sequences.get(period_uid) {
            return sequence;
        }
        let sequence = self.next_window_sequence;
        self.next_window_sequence += 1;
        self.window_sequences.insert(period_uid.clone(), sequence);
        sequence
    }
}
