//! Numeric conversion helpers for the wire codec and clocks.
//!
//! The wire format fixes the width of counts and timestamps; these helpers
//! keep the narrowing conversions in one audited place.

use std::time::{SystemTime, UNIX_EPOCH};

/// Convert a record count into the `u32` carried on the wire.
///
/// Returns `None` when the count does not fit.
#[must_use]
pub fn count_to_u32(count: usize) -> Option<u32> {
    u32::try_from(count).ok()
}

/// Convert a wire count back into a `usize`.
#[must_use]
pub fn count_from_u32(count: u32) -> Option<usize> {
    usize::try_from(count).ok()
}

/// Convert a grid index into the float domain used for ground coordinates.
#[expect(
    clippy::cast_precision_loss,
    reason = "Terrain grids are far smaller than 2^24 samples per axis."
)]
#[must_use]
pub fn index_to_f32(index: usize) -> f32 {
    index as f32
}

/// Floor a non-negative coordinate and convert it to a grid index.
///
/// Returns `None` for negative or non-finite input.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "The floored value is checked to be a non-negative finite float."
)]
#[must_use]
pub fn floor_to_index(value: f32) -> Option<usize> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.floor() as usize)
}

/// Milliseconds since the Unix epoch, saturating at `u64::MAX`.
///
/// A clock set before the epoch reports `0`.
#[must_use]
pub fn unix_millis(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Milliseconds since the Unix epoch for the current wall clock.
#[must_use]
pub fn now_millis() -> u64 {
    unix_millis(SystemTime::now())
}
