//! Pure backoff/jitter/stagger functions for the analyzer's advanced retry
//! schedule, kept free of I/O so they are deterministic and property-test
//! friendly — see spec §9's design note on exposing retry math as a pure
//! `backoff(attempt, consecutiveThrottles, hash) -> duration` function.

use sha2::{Digest, Sha256};
use std::time::Duration;

const BASE_DELAY_SECS: u64 = 2;
const MAX_DELAY_SECS: u64 = 60;
const MAX_ATTEMPTS: u32 = 10;
const THROTTLE_ESCALATION_THRESHOLD: u32 = 3;

/// A stable digest of `(worker_identity, payload)`, used both to derive the
/// initial stagger and as a per-call jitter seed so concurrent workers
/// analyzing different events don't collide, while the same worker/payload
/// pair always staggers identically (useful for tests).
pub fn stagger_seed(worker_identity: &str, payload: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(worker_identity.as_bytes());
    hasher.update(b"|");
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes)
}

/// Initial stagger before the first attempt: `0..3s`, derived from
/// [`stagger_seed`] so concurrent workers don't all call the analyzer at
/// once right after a cold deploy.
pub fn initial_stagger(seed: u64) -> Duration {
    let fraction = (seed % 1000) as f64 / 1000.0;
    Duration::from_secs_f64(fraction * 3.0)
}

/// Deterministic jitter fraction in `[0.20, 0.40)`, derived from `seed` and
/// `attempt` so repeated calls with the same inputs produce the same delay.
fn jitter_fraction(seed: u64, attempt: u32) -> f64 {
    let mixed = seed.wrapping_add(attempt as u64).wrapping_mul(2654435761);
    let unit = (mixed % 1000) as f64 / 1000.0; // [0, 1)
    0.20 + unit * 0.20
}

/// Backoff delay before retrying attempt `attempt` (0-indexed, the attempt
/// that just failed) after `consecutive_throttles` throttles so far.
/// Exponential base-2 while `consecutive_throttles <= 3`; escalates to
/// base-3 beyond that (circuit-breaker behavior for persistent throttling).
/// Adds 20-40% jitter plus a small per-instance stagger, both derived from
/// `seed` so the whole function is pure.
pub fn backoff(attempt: u32, consecutive_throttles: u32, seed: u64) -> Duration {
    let base: u64 = if consecutive_throttles <= THROTTLE_ESCALATION_THRESHOLD {
        BASE_DELAY_SECS.saturating_mul(2u64.saturating_pow(attempt))
    } else {
        BASE_DELAY_SECS.saturating_mul(3u64.saturating_pow(attempt))
    };
    let delay = base.min(MAX_DELAY_SECS) as f64;

    let jitter = delay * jitter_fraction(seed, attempt);
    let instance_stagger = (seed % 100) as f64 / 100.0 * 2.0;

    Duration::from_secs_f64(delay + jitter + instance_stagger)
}

/// Maximum number of analyzer attempts before the deterministic fallback is
/// used.
pub fn max_attempts() -> u32 {
    MAX_ATTEMPTS
}
