//! Deterministic experiment bucketing.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Buckets cover the half-open interval `[0, TOTAL_BUCKETS)`.
pub const TOTAL_BUCKETS: u32 = 100;

/// Assigns a device to an experiment bucket.
///
/// Must be deterministic and stateless: the same device id and salt always
/// yield the same bucket, so variant assignment is stable across sessions.
pub trait Bucketer {
    /// Compute the bucket for `device_id` under `salt`. Returns a value in
    /// `[0, TOTAL_BUCKETS)`.
    fn bucket(&self, device_id: &Uuid, salt: &str) -> u32;
}

/// The default (and only) bucketer.
///
/// Hashes the uppercased canonical device id concatenated with the uppercased
/// salt, and reduces the last four digest bytes (big-endian) modulo
/// [`TOTAL_BUCKETS`].
pub struct Sha256Bucketer;

impl Bucketer for Sha256Bucketer {
    fn bucket(&self, device_id: &Uuid, salt: &str) -> u32 {
        let mut input = device_id.hyphenated().to_string().to_uppercase();
        input.push_str(&salt.to_uppercase());

        let digest = Sha256::digest(input.as_bytes());
        let tail = u32::from_be_bytes([digest[28], digest[29], digest[30], digest[31]]);
        tail % TOTAL_BUCKETS
    }
}
