//! # Period Queue
//!
//! Maintains the ordered chain of content and ad spans being loaded and
//! played, and computes what comes next from the live timeline.
//!
//! ## Overview
//!
//! The queue is the scheduling brain sitting between a [`Timeline`]
//! (what content exists, where ads interrupt it) and the renderers that
//! pump samples:
//!
//! - [`PeriodId`] names one span occurrence: a content stretch of a period
//!   or a single ad within an ad group.
//! - [`PeriodInfo`] is the derived, immutable descriptor of one span:
//!   start/end positions, duration and boundary flags. It is always
//!   recomputed from the timeline, never patched in place.
//! - [`PeriodHolder`] owns one enqueued span plus whatever per-period
//!   resources (sample streams) the embedder attaches to it.
//! - [`PeriodQueue`] owns the chain of holders from the playing span
//!   through the loading span and reconciles it against timeline changes.
//!
//! The queue never holds a timeline itself: every operation takes the
//! current timeline as an argument, which keeps reconciliation a pure
//! function of (old chain, new timeline).
//!
//! [`Timeline`]: core_timeline::Timeline

pub mod holder;
pub mod id;
pub mod info;
pub mod queue;

pub use holder::PeriodHolder;
pub use id::{AdAddress, PeriodId};
pub use info::PeriodInfo;
pub use queue::{PeriodQueue, PlaybackStart, INITIAL_RENDERER_POSITION_OFFSET_US};
