//! Deterministic pseudo-random u32 generation for benchmarks and tests.

/// 64-bit linear congruential generator emitting the upper-middle 32 bits of
/// its state. Deterministic per seed, so test inputs are reproducible across
/// runs and platforms.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 16) as u32
    }

    pub fn fill(&mut self, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.next_u32()).collect()
    }
}
