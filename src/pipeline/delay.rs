//! Reply delay policy.
//!
//! The wait window is a pure function of the triggering message's ID so
//! repeated polls agree on when a reply becomes due.

use chrono::{DateTime, Utc};

/// Shortest delay, in minutes.
pub const MIN_DELAY_MINUTES: u32 = 5;

/// Longest delay, in minutes.
pub const MAX_DELAY_MINUTES: u32 = 15;

const DELAY_SPREAD: u32 = MAX_DELAY_MINUTES - MIN_DELAY_MINUTES + 1;

/// Minutes to wait before replying to `message_id`, in `[5, 15]`.
///
/// Sum of the ID's UTF-16 code units, mod 11, plus 5.
pub fn compute_delay_minutes(message_id: &str) -> u32 {
    let sum = message_id
        .encode_utf16()
        .fold(0u32, |acc, unit| (acc + u32::from(unit)) % DELAY_SPREAD);
    MIN_DELAY_MINUTES + sum
}

/// Whole minutes elapsed between `received_at` and `now`. Negative when the
/// message is timestamped in the future.
pub fn elapsed_minutes(received_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - received_at).num_minutes()
}

/// Whether a reply to the message is due at `now`.
pub fn is_reply_due(message_id: &str, received_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    elapsed_minutes(received_at, now) >= i64::from(compute_delay_minutes(message_id))
}
