//! Deterministic PRNG for production trials.
//!
//! Uses the SplitMix64 algorithm: 8 bytes of state, trivially cloned into
//! every frame so that replaying from any frame draws the same sequence.

use crate::fixed::Fixed64;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Returns `true` with the given probability (Fixed64 in [0, 1]).
    ///
    /// Probabilities at or outside the bounds never consume a draw, so a
    /// factory with no error rates leaves the sequence untouched.
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0,1) the raw Q32.32 bits are the fraction scaled to
        // [0, 2^32); compare against the upper half of a fresh draw.
        let upper = self.next_u64() >> 32;
        upper < probability.to_bits() as u64
    }

    /// One production trial: succeeds with probability `1 - error_rate`.
    pub fn trial(&mut self, error_rate: Fixed64) -> bool {
        let error_rate = error_rate.clamp(Fixed64::ZERO, Fixed64::ONE);
        self.chance(Fixed64::ONE - error_rate)
    }

    /// Get the internal state (for hashing/serialization).
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(0)
    }
}
