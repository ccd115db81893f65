//! Proof-of-work target computation, search, and validation.
//!
//! An object's nonce is valid when
//!
//! ```text
//! trial = dSHA-512(nonce_be ‖ SHA-512(payload))[0..8] as u64  ≤  target
//! ```
//!
//! where the target shrinks (the work grows) with payload length,
//! time-to-live, and the difficulty parameters demanded by the
//! recipient:
//!
//! ```text
//! target = 2^64 / (trials × (len + extra + ttl·(len + extra)/2^16))
//! ```
//!
//! # Blocking
//!
//! The search is CPU-bound and runs on `tokio::task::spawn_blocking`;
//! [`solve`] is the long suspension point of every encode. Dropping the
//! future raises a cancellation flag that the worker observes within
//! one check interval, releasing the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitmsg_crypto::hash::{double_sha512, sha512};
use bitmsg_types::{BitmsgError, Result};

use crate::object::NONCE_LEN;

pub use bitmsg_crypto::address::{
    DEFAULT_NONCE_TRIALS_PER_BYTE, DEFAULT_PAYLOAD_LENGTH_EXTRA_BYTES,
};

/// How many nonces the worker tries between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 0x1_0000;

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Per-recipient POW difficulty parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Difficulty {
    /// Average nonce trials demanded per payload octet.
    pub nonce_trials_per_byte: u64,
    /// Octets added to the payload length before scaling.
    pub payload_length_extra_bytes: u64,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self {
            nonce_trials_per_byte: DEFAULT_NONCE_TRIALS_PER_BYTE,
            payload_length_extra_bytes: DEFAULT_PAYLOAD_LENGTH_EXTRA_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Computes the POW target for an object.
///
/// `payload_length` is the final wire length, nonce included. Zero
/// difficulty parameters are clamped to the network defaults so a
/// hostile pubkey cannot demand a division by zero.
pub fn target(payload_length: u64, ttl: u64, difficulty: &Difficulty) -> u64 {
    let trials = if difficulty.nonce_trials_per_byte == 0 {
        DEFAULT_NONCE_TRIALS_PER_BYTE
    } else {
        difficulty.nonce_trials_per_byte
    };
    let extra = difficulty.payload_length_extra_bytes;

    let byte_count = u128::from(payload_length) + u128::from(extra);
    let denominator =
        u128::from(trials) * (byte_count + u128::from(ttl) * byte_count / 65536);
    let denominator = denominator.max(1);

    ((1u128 << 64) / denominator).min(u128::from(u64::MAX)) as u64
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Searches for a nonce whose trial value fits under `target`.
///
/// `payload` is the object payload **without** its nonce. The search
/// runs on a blocking worker thread; the returned future suspends until
/// a nonce is found or the search is cancelled.
///
/// # Errors
///
/// - [`BitmsgError::PowCancelled`] if the caller's future is dropped
///   (the worker observes the flag and stops) or the nonce space is
///   exhausted.
pub async fn solve(target: u64, payload: &[u8]) -> Result<u64> {
    let initial_hash = sha512(payload);
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelGuard(Arc::clone(&cancel));

    tracing::debug!(pow_target = target, payload_len = payload.len(), "starting POW search");

    let handle = tokio::task::spawn_blocking(move || search(target, &initial_hash, &cancel));
    handle.await.map_err(|e| BitmsgError::CryptoError {
        reason: format!("POW worker failed: {e}"),
    })?
}

/// Raises the cancellation flag when the owning future is dropped.
struct CancelGuard(Arc<AtomicBool>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn search(target: u64, initial_hash: &[u8; 64], cancel: &AtomicBool) -> Result<u64> {
    let mut preimage = [0u8; NONCE_LEN + 64];
    preimage[NONCE_LEN..].copy_from_slice(initial_hash);

    for nonce in 0..u64::MAX {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            tracing::debug!(nonce, "POW search cancelled");
            return Err(BitmsgError::PowCancelled);
        }
        preimage[..NONCE_LEN].copy_from_slice(&nonce.to_be_bytes());
        if trial_value(&preimage) <= target {
            tracing::debug!(nonce, "POW search finished");
            return Ok(nonce);
        }
    }
    Err(BitmsgError::PowCancelled)
}

fn trial_value(preimage: &[u8]) -> u64 {
    let digest = double_sha512(preimage);
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(arr)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks the nonce of a complete object payload against a target.
///
/// Decoders do not call this — relay acceptance is the object store's
/// concern — but it is the receive-side half of [`solve`].
pub fn check(payload_with_nonce: &[u8], target: u64) -> bool {
    if payload_with_nonce.len() < NONCE_LEN {
        return false;
    }
    let initial_hash = sha512(&payload_with_nonce[NONCE_LEN..]);
    let mut preimage = [0u8; NONCE_LEN + 64];
    preimage[..NONCE_LEN].copy_from_slice(&payload_with_nonce[..NONCE_LEN]);
    preimage[NONCE_LEN..].copy_from_slice(&initial_hash);
    trial_value(&preimage) <= target
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_formula_small_payload() {
        // 1000 × (1042 + 300·1042/65536) = 1000 × (1042 + 4) = 1_046_000
        let difficulty = Difficulty::default();
        let expected = ((1u128 << 64) / 1_046_000) as u64;
        assert_eq!(target(42, 300, &difficulty), expected);
    }

    #[test]
    fn target_shrinks_with_length_ttl_and_difficulty() {
        let base = Difficulty::default();
        let harder = Difficulty {
            nonce_trials_per_byte: 2000,
            payload_length_extra_bytes: 1000,
        };

        assert!(target(5000, 300, &base) < target(100, 300, &base));
        assert!(target(100, 86_400, &base) < target(100, 300, &base));
        assert!(target(100, 300, &harder) < target(100, 300, &base));
    }

    #[test]
    fn zero_trials_clamped_to_default() {
        let hostile = Difficulty {
            nonce_trials_per_byte: 0,
            payload_length_extra_bytes: 0,
        };
        let default_trials = Difficulty {
            nonce_trials_per_byte: DEFAULT_NONCE_TRIALS_PER_BYTE,
            payload_length_extra_bytes: 0,
        };
        assert_eq!(target(100, 300, &hostile), target(100, 300, &default_trials));
    }

    #[tokio::test]
    async fn solve_and_check_roundtrip() -> Result<()> {
        // A huge target so the search ends after a handful of trials.
        let target = u64::MAX / 2;
        let payload = b"small test object".to_vec();

        let nonce = solve(target, &payload).await?;

        let mut full = nonce.to_be_bytes().to_vec();
        full.extend_from_slice(&payload);
        assert!(check(&full, target));
        Ok(())
    }

    #[tokio::test]
    async fn tampered_payload_fails_check() -> Result<()> {
        let target = u64::MAX / 4;
        let payload = b"object".to_vec();
        let nonce = solve(target, &payload).await?;

        let mut full = nonce.to_be_bytes().to_vec();
        full.extend_from_slice(&payload);
        full.push(0xFF);
        assert!(!check(&full, 0));
        Ok(())
    }

    #[test]
    fn check_rejects_short_buffer() {
        assert!(!check(&[0u8; 7], u64::MAX));
    }
}
