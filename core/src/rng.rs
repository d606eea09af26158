//! Seedable random source for score jitter and confidence.
//!
//! RULE: the scoring engine never calls a platform RNG directly.
//! All randomness flows through a ScoreRng handed to it at
//! construction, so tests can pin the seed and reproduce results.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct ScoreRng {
    inner: Pcg64Mcg,
}

impl ScoreRng {
    /// Deterministic stream derived from `seed`.
    pub fn seeded(seed: u64) -> Self {
        let derived_seed = seed ^ 0x9e37_79b9_7f4a_7c15;
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Non-deterministic stream for production use.
    pub fn from_entropy() -> Self {
        Self {
            inner: Pcg64Mcg::from_entropy(),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Symmetric noise in [-amplitude, +amplitude).
    pub fn jitter(&mut self, amplitude: f64) -> f64 {
        (self.next_f64() - 0.5) * 2.0 * amplitude
    }

    /// Uniform draw in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + self.next_f64() * (high - low)
    }
}

impl Default for ScoreRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
