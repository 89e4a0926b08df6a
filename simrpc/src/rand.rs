//! Random number generation for fault injection.
//!
//! Every draw the network makes goes through one [`GlobalRng`], so a run with
//! a fixed seed makes the same drop/delay/reorder decisions in the same order.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use spin::Mutex;
use std::{ops::Range, sync::Arc};

/// Global random number generator shared by the tasks of one network.
#[derive(Clone)]
pub struct GlobalRng {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    seed: u64,
    rng: SmallRng,
}

impl GlobalRng {
    /// Create a new RNG using the given seed.
    pub fn new_with_seed(seed: u64) -> Self {
        GlobalRng {
            inner: Arc::new(Mutex::new(Inner {
                seed,
                rng: SmallRng::seed_from_u64(seed),
            })),
        }
    }

    /// Create a new RNG seeded from entropy.
    pub fn new() -> Self {
        Self::new_with_seed(rand::thread_rng().gen())
    }

    /// Returns the seed.
    pub fn seed(&self) -> u64 {
        self.inner.lock().seed
    }

    /// Call function on the inner RNG.
    pub fn with<T>(&self, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        let mut lock = self.inner.lock();
        f(&mut lock.rng)
    }

    /// Returns `true` with probability `p`.
    pub fn gen_bool(&self, p: f64) -> bool {
        // `gen_bool` panics outside of [0, 1]
        let p = p.clamp(0.0, 1.0);
        self.with(|rng| rng.gen_bool(p))
    }

    /// A uniform draw from `range`, or `range.start` if the range is empty.
    pub fn gen_range(&self, range: Range<u64>) -> u64 {
        if range.is_empty() {
            return range.start;
        }
        self.with(|rng| rng.gen_range(range))
    }
}

impl Default for GlobalRng {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GlobalRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRng")
            .field("seed", &self.seed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_draws() {
        let a = GlobalRng::new_with_seed(7);
        let b = GlobalRng::new_with_seed(7);
        let xs: Vec<_> = (0..32).map(|_| a.gen_range(0..1000)).collect();
        let ys: Vec<_> = (0..32).map(|_| b.gen_range(0..1000)).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed(), 7);
    }

    #[test]
    fn empty_range() {
        let rng = GlobalRng::new_with_seed(0);
        assert_eq!(rng.gen_range(5..5), 5);
        assert!(!rng.gen_bool(0.0));
        assert!(rng.gen_bool(1.0));
    }
}
