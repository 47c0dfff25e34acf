/// Chooses one candidate among several runnable threads each scheduler step.
///
/// Implementations get only the candidate count, never the candidates themselves — the
/// round runner keeps the mapping from index to thread, so a policy only has to answer
/// "which of these N" without knowing what they represent.
pub trait SchedulePolicy {
    /// Returns an index in `0..len`. `len` is always greater than zero.
    fn choose(&mut self, len: usize) -> usize;
}

/// The default policy: pick uniformly at random, seeded for reproducibility.
///
/// Grounded in the same source of randomness the teacher's own benches use
/// (`fastrand`), not `rand`, to keep the dependency stack aligned.
pub struct UniformRandom {
    rng: fastrand::Rng,
}

impl UniformRandom {
    /// Builds a policy seeded for deterministic replay.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed) }
    }
}

impl SchedulePolicy for UniformRandom {
    fn choose(&mut self, len: usize) -> usize {
        self.rng.usize(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::{SchedulePolicy, UniformRandom};

    #[test]
    fn same_seed_gives_same_sequence() {
        let mut a = UniformRandom::new(7);
        let mut b = UniformRandom::new(7);
        for _ in 0..20 {
            assert_eq!(a.choose(5), b.choose(5));
        }
    }

    #[test]
    fn choice_is_always_in_range() {
        let mut policy = UniformRandom::new(1);
        for _ in 0..100 {
            assert!(policy.choose(3) < 3);
        }
    }
}
