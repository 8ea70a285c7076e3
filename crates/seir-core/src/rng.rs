//! Deterministic RNG wrapper and seed-derivation helpers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Spacing between the seeds handed to consecutive simulation workers.
pub const WORKER_SEED_STRIDE: u64 = 1000;

/// Deterministic RNG handle used by the control loop and by every worker.
///
/// The control loop owns one handle seeded from a substream of the configured
/// seed; each worker owns a private handle seeded with [`worker_seed`].
/// Substream seeds hash `(master_seed, substream)` with zero-keyed SipHash-1-3.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Handle seeded with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Handle seeded from substream `substream` of `master_seed`.
    pub fn substream(master_seed: u64, substream: u64) -> Self {
        Self::from_seed(derive_substream_seed(master_seed, substream))
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

/// Seed for worker `worker_index` during dispatch number `call_counter`.
///
/// `base + WORKER_SEED_STRIDE * (worker_index + 1) + call_counter`, wrapping.
pub fn worker_seed(base_seed: u64, worker_index: usize, call_counter: u64) -> u64 {
    base_seed
        .wrapping_add(WORKER_SEED_STRIDE.wrapping_mul(worker_index as u64 + 1))
        .wrapping_add(call_counter)
}
