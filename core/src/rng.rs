//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call a platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the single master seed in the configuration.
//!
//! Each agent and the correlation engine get their own stream,
//! seeded from (master_seed XOR stream_index * golden ratio). This means:
//!   - Adding a staff member at the end of the roster never changes
//!     the streams of existing agents.
//!   - Each stream is reproducible in isolation, whatever thread runs it.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// A named, deterministic RNG owned by exactly one thread of control.
pub struct StreamRng {
    pub name: String,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from the master seed and a stable stream index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ stream_index.wrapping_mul(MIXING_CONSTANT);
        Self {
            name: "unnamed".to_string(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Uniform integer in [low, high], both ends included.
    pub fn range_inclusive(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }

    /// Draw an index from relative weights. Weights need not sum to one.
    /// Returns None when the weights are empty, negative or all zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let dist = WeightedIndex::new(weights).ok()?;
        Some(dist.sample(&mut self.inner))
    }
}

/// Hands out streams for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stream(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// Stream for the agent at `roster_index`. `generation` counts restarts
    /// so a restarted agent does not replay its earlier moves. Agent streams
    /// start after the fixed slots so they never collide with them.
    pub fn for_agent(&self, roster_index: usize, generation: u64, staff: &str) -> StreamRng {
        let index = AGENT_STREAM_BASE
            + generation.wrapping_mul(AGENT_GENERATION_STRIDE)
            + roster_index as u64;
        StreamRng::new(self.master_seed, index).with_name(format!("agent:{staff}"))
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries — only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Correlation = 0,
    // Add new fixed streams here — append only.
}

const AGENT_STREAM_BASE: u64 = 1_000;
const AGENT_GENERATION_STRIDE: u64 = 1_000_000;

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let bank = RngBank::new(7);
        let mut a = bank.for_agent(3, 0, "AS4");
        let mut b = bank.for_agent(3, 0, "AS4");
        for _ in 0..32 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn restart_generation_changes_stream() {
        let bank = RngBank::new(7);
        let mut first = bank.for_agent(0, 0, "AS1");
        let mut second = bank.for_agent(0, 1, "AS1");
        let a: Vec<f64> = (0..8).map(|_| first.next_f64()).collect();
        let b: Vec<f64> = (0..8).map(|_| second.next_f64()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn weighted_index_rejects_degenerate_weights() {
        let mut rng = StreamRng::new(1, 0);
        assert_eq!(rng.weighted_index(&[]), None);
        assert_eq!(rng.weighted_index(&[0.0, 0.0]), None);
        assert_eq!(rng.weighted_index(&[0.0, 2.0]), Some(1));
    }

    #[test]
    fn range_inclusive_covers_both_ends() {
        let mut rng = StreamRng::new(11, 0);
        let draws: Vec<u64> = (0..500).map(|_| rng.range_inclusive(3, 8)).collect();
        assert!(draws.iter().all(|d| (3..=8).contains(d)));
        assert!(draws.contains(&3));
        assert!(draws.contains(&8));
    }
}
