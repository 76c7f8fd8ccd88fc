//! Engine configuration and the per-frame state hash.

use crate::fixed::{Fixed64, Ticks};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Session-wide settings chosen at engine construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the production trial RNG.
    pub seed: u64,
    /// Material name that counts toward order completion.
    pub finished_good: String,
    /// Steps with this name are where finished goods are counted.
    pub shipping_step: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            finished_good: "Complete Seat".to_string(),
            shipping_step: "Shipping".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A deterministic hash of one frame, for comparing two runs cheaply.
///
/// Uses FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Feed an optional tick, distinguishing `None` from `Some(0)`.
    pub fn write_opt_ticks(&mut self, v: Option<Ticks>) {
        match v {
            Some(t) => {
                self.write(&[1]);
                self.write_u64(t);
            }
            None => self.write(&[0]),
        }
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
