// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Seed source for a single run.
///
/// Every stochastic component (tissue noise, controller dropout) draws from
/// its own stream derived from the run seed and a component label, so adding
/// a consumer never perturbs the draws seen by another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedSource {
    base_seed: u64,
}

impl SeedSource {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Derives a deterministic seed for a given component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns a RNG derived from the provided label.
    pub fn rng_for(&self, label: &str) -> StdRng {
        StdRng::seed_from_u64(self.seed_for(label))
    }

    /// Returns a RNG seeded from an explicit per-component seed when one is
    /// configured, otherwise from the label-derived stream.
    pub fn rng_from_optional(&self, seed: Option<u64>, label: &str) -> StdRng {
        match seed {
            Some(value) => StdRng::seed_from_u64(value),
            None => self.rng_for(label),
        }
    }
}

impl Default for SeedSource {
    fn default() -> Self {
        Self::new(1337)
    }
}
