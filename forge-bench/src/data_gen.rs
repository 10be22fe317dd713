use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded input generator so every run scans the same data.
pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `count` values in `0..bound`.
    pub fn bounded_u32(&mut self, count: usize, bound: u32) -> Vec<u32> {
        (0..count).map(|_| self.rng.gen_range(0..bound.max(1))).collect()
    }

    /// `count` values in `0..bound`.
    pub fn bounded_u64(&mut self, count: usize, bound: u64) -> Vec<u64> {
        (0..count).map(|_| self.rng.gen_range(0..bound.max(1))).collect()
    }

    /// `count` values in `[0.0, 1.0)`.
    pub fn unit_f64(&mut self, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.rng.gen::<f64>()).collect()
    }
}

/// Largest per-element value for which a `u32` sum of `count` elements
/// cannot overflow.
pub fn u32_bound_for(count: usize) -> u32 {
    let per_element = u32::MAX as usize / count.max(1);
    per_element.clamp(1, 4_096) as u32
}
