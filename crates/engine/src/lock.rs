use std::time::Duration;

use stackdraft_core::{Draft, Timestamp, UserSub};

/// Whether `draft` blocks `requester` at `now`.
///
/// A draft never blocks its own holder. For everyone else it blocks until
/// `locked_at` is more than `ttl` in the past. `locked_at` is fixed when the
/// draft is created, so the lock ages even while its holder keeps editing.
pub fn is_lock_active(
    draft: Option<&Draft>,
    requester: &UserSub,
    now: Timestamp,
    ttl: Duration,
) -> bool {
    match draft {
        None => false,
        Some(draft) if draft.locked_by == *requester => false,
        Some(draft) => !is_expired(draft, now, ttl),
    }
}

pub fn is_expired(draft: &Draft, now: Timestamp, ttl: Duration) -> bool {
    now.since(draft.locked_at) > ttl
}
