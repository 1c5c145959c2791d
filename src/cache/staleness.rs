//! Staleness checking for the cached working tree.

use super::metadata::CacheMetadata;
use crate::types::MaxAge;

/// Check if a cache needs refreshing at time `now` (seconds since epoch).
///
/// Returns true if:
/// - No refresh has ever succeeded (`meta` is `None`)
/// - `meta.timestamp + max_age <= now`
///
/// An infinite `max_age` is never stale once populated. Identity checks are
/// the caller's job.
pub fn is_stale(meta: Option<&CacheMetadata>, max_age: MaxAge, now: f64) -> bool {
    match meta {
        None => true,
        Some(meta) => meta.timestamp + max_age.as_secs_f64() <= now,
    }
}
