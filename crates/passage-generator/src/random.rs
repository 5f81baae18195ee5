use crate::Generator;
use parking_lot::Mutex;
use passage_core::code::{ALPHABET, CODE_LENGTH};
use passage_core::InviteCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Samples every symbol of a code independently and uniformly from the
/// 36-symbol alphabet.
#[derive(Debug)]
pub struct RandomGenerator {
    rng: Mutex<StdRng>,
}

impl RandomGenerator {
    /// Creates a generator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Creates a generator that yields the same sequence for the same seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    type Output = InviteCode;

    fn generate(&self) -> InviteCode {
        let mut rng = self.rng.lock();
        let mut indices = [0_u8; CODE_LENGTH];
        for index in indices.iter_mut() {
            *index = rng.random_range(0..ALPHABET.len() as u8);
        }
        InviteCode::from_indices(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn codes_have_expected_shape() {
        let generator = RandomGenerator::new();
        for _ in 0..1_000 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = RandomGenerator::seeded(42);
        let b = RandomGenerator::seeded(42);
        assert_eq!(a.generate_batch(20), b.generate_batch(20));
    }

    #[test]
    fn different_seeds_diverge() {
        let a = RandomGenerator::seeded(1);
        let b = RandomGenerator::seeded(2);
        assert_ne!(a.generate_batch(5), b.generate_batch(5));
    }

    #[test]
    fn every_symbol_is_reachable() {
        let generator = RandomGenerator::seeded(7);
        let mut counts: HashMap<u8, usize> = HashMap::new();
        for code in generator.generate_batch(2_000) {
            for b in code.as_str().bytes() {
                *counts.entry(b).or_default() += 1;
            }
        }
        // 12_000 samples over 36 symbols: each expected ~333 times.
        assert_eq!(counts.len(), ALPHABET.len());
        assert!(counts.values().all(|&n| n > 200), "skewed: {counts:?}");
    }

    #[test]
    fn batch_is_practically_unique() {
        let generator = RandomGenerator::seeded(99);
        let codes: HashSet<_> = generator.generate_batch(1_000).into_iter().collect();
        assert_eq!(codes.len(), 1_000);
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RandomGenerator>();
    }
}
