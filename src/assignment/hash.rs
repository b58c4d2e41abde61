//! Identity hashing for deterministic bucketing.
//!
//! Base-31 polynomial rolling hash over UTF-16 code units with 32-bit signed
//! wraparound, then absolute value. The definition matches what browser
//! clients compute, so the same visitor lands in the same bucket on every
//! platform that follows it.

/// Separator placed between identity and experiment id in the hash key.
pub const KEY_SEPARATOR: char = '_';

/// Number of traffic buckets.
pub const BUCKET_COUNT: u32 = 100;

/// Hash an arbitrary key.
///
/// `i32::MIN` has no positive counterpart in `i32`, so the result is `u32`.
#[must_use]
pub fn rolling_hash(key: &str) -> u32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| {
            h.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
        .unsigned_abs()
}

/// Hash of `"{identity}_{experiment_id}"`.
#[must_use]
pub fn identity_hash(identity: &str, experiment_id: &str) -> u32 {
    let mut key = String::with_capacity(identity.len() + experiment_id.len() + 1);
    key.push_str(identity);
    key.push(KEY_SEPARATOR);
    key.push_str(experiment_id);
    rolling_hash(&key)
}

/// Traffic bucket in `[1, 100]`.
#[must_use]
pub const fn bucket(hash: u32) -> u32 {
    hash % BUCKET_COUNT + 1
}
