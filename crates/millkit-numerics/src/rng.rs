//! The explicit random stream threaded through stochastic algorithms.
//!
//! There is no global or thread-local generator anywhere in Millkit: every
//! stochastic call constructs one `SeededRng` from the caller's seed and
//! passes it down by `&mut`. Same seed, same draws, same output bits.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub struct SeededRng {
    inner: StdRng,
    spare_normal: Option<f64>,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
            spare_normal: None,
        }
    }

    /// Uniform in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.gen_range(0.0..1.0)
    }

    /// Uniform in `[low, high)`; returns `low` for an empty interval.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.inner.gen_range(low..high)
        } else {
            low
        }
    }

    /// Uniform index in `0..n`; `0` when `n == 0`.
    pub fn index(&mut self, n: usize) -> usize {
        if n == 0 { 0 } else { self.inner.gen_range(0..n) }
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.unit() < probability
    }

    /// Normal draw via Box-Muller, caching the second variate.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return mean + std_dev * z;
        }
        let u1 = self.unit().max(f64::MIN_POSITIVE);
        let u2 = self.unit();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        self.spare_normal = Some(r * theta.sin());
        mean + std_dev * r * theta.cos()
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    /// Roulette-wheel pick over the weights; negative or non-finite entries
    /// count as zero, and an all-zero wheel falls back to a uniform pick.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let clean = |w: &f64| if w.is_finite() && *w > 0.0 { *w } else { 0.0 };
        let peak = weights.iter().map(clean).fold(0.0, f64::max);
        if peak <= 0.0 {
            return self.index(weights.len());
        }
        // Rescaled so the total cannot overflow.
        match WeightedIndex::new(weights.iter().map(|w| clean(w) / peak)) {
            Ok(wheel) => wheel.sample(&mut self.inner),
            Err(_) => self.index(weights.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..32 {
            assert_eq!(a.unit().to_bits(), b.unit().to_bits());
            assert_eq!(a.normal(0.0, 1.0).to_bits(), b.normal(0.0, 1.0).to_bits());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(2);
        let xs: Vec<f64> = (0..8).map(|_| a.unit()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.unit()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn degenerate_ranges_do_not_panic() {
        let mut rng = SeededRng::new(7);
        assert_eq!(rng.uniform(3.0, 3.0), 3.0);
        assert_eq!(rng.index(0), 0);
        assert!(rng.weighted_index(&[0.0, 0.0, 0.0]) < 3);
    }

    #[test]
    fn weighted_index_skips_zero_weights() {
        let mut rng = SeededRng::new(9);
        for _ in 0..100 {
            assert_eq!(rng.weighted_index(&[0.0, 5.0, 0.0]), 1);
        }
    }

    #[test]
    fn weighted_index_tolerates_hostile_weights() {
        let mut rng = SeededRng::new(3);
        for _ in 0..100 {
            let i = rng.weighted_index(&[f64::NAN, 1e308, -4.0, f64::INFINITY, 1e308]);
            assert!(i == 1 || i == 4, "picked {i}");
        }
        assert!(rng.weighted_index(&[f64::NAN, -1.0]) < 2);
        assert_eq!(rng.weighted_index(&[]), 0);
    }
}
