//! Constants and helpers for the microsecond position axis.
//!
//! Positions and durations are signed microseconds. Unknown values are
//! represented with `Option<i64>`; the one in-band sentinel is
//! [`TIME_END_OF_SOURCE`], which marks a position at the very end of a
//! period (used for postroll ad groups and end-position clipping) without
//! requiring the period duration to be known.

/// Sentinel for a position at the end of the source, wherever that ends up
/// being. Always compares less than any real position, so it must be
/// checked for explicitly before doing arithmetic.
pub const TIME_END_OF_SOURCE: i64 = i64::MIN;

/// Microseconds per second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Converts whole seconds to microseconds.
pub const fn secs_to_us(seconds: i64) -> i64 {
    seconds * MICROS_PER_SECOND
}
