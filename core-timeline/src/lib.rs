//! # Timeline Data Model
//!
//! Immutable description of the content being played or transformed: windows,
//! periods and per-period ad insertion metadata.
//!
//! ## Overview
//!
//! This crate is the leaf data model consumed by the period queue:
//! - [`Timeline`]: ordered windows, each spanning one or more periods.
//!   A timeline is immutable per version and replaced wholesale when the
//!   content description changes (e.g. a manifest refresh or an ad load).
//! - [`AdPlaybackState`]: per-period mapping of ad group positions to ad
//!   group state (count, durations, load/play state, resume offsets).
//! - Time sentinels and helpers for the microsecond position axis.

pub mod ad_state;
pub mod time;
pub mod timeline;

pub use ad_state::{AdGroup, AdPlaybackState, AdState};
pub use time::{MICROS_PER_SECOND, TIME_END_OF_SOURCE};
pub use timeline::{PeriodUid, Timeline, TimelinePeriod, TimelineWindow};
