//! Probabilistic index choosers.
//!
//! A chooser draws indices from the 0-based dense range `[0, item_count)` and is used to select
//! existing keys for read/update/scan/delete operations. Four distributions are supported:
//!
//! - `uniform`: every index is equally likely.
//! - `zipfian`: the Gray et al. (SIGMOD '94) bounded Zipfian sampler, where index 0 is the most
//!   popular, followed by index 1, and so on.
//! - scattered zipfian: a Zipfian stream passed through an FNV-1a hash so that the hot indices
//!   are spread across the whole range instead of clustering at the low end.
//! - `latest`: the Zipfian stream mirrored to favor the highest (most recently inserted)
//!   indices.
//!
//! Item counts are mutable: a chooser can be rebuilt for an arbitrary count with
//! [`Chooser::set_item_count`], or adjusted incrementally with [`Chooser::grow_by`] and
//! [`Chooser::shrink_by`] as keys are inserted and deleted.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::zeta;

/// A chooser over `[0, item_count)` under a named distribution.
///
/// The variants share a small interface instead of a trait object so that per-request
/// dispatch stays a jump table and the producer can own its choosers by value.
#[derive(Clone, Debug)]
pub enum Chooser {
    Uniform(UniformChooser),
    Zipfian(ZipfianChooser),
    ScatteredZipfian(ScatteredZipfianChooser),
    Latest(LatestChooser),
}

impl Chooser {
    /// Draw the next index in `[0, item_count)`.
    pub fn next(&mut self, rng: &mut impl Rng) -> usize {
        match self {
            Chooser::Uniform(c) => c.next(rng),
            Chooser::Zipfian(c) => c.next(rng),
            Chooser::ScatteredZipfian(c) => c.next(rng),
            Chooser::Latest(c) => c.next(rng),
        }
    }

    /// Rebuild the chooser for a new item count.
    pub fn set_item_count(&mut self, item_count: usize) {
        match self {
            Chooser::Uniform(c) => c.set_item_count(item_count),
            Chooser::Zipfian(c) => c.set_item_count(item_count),
            Chooser::ScatteredZipfian(c) => c.inner.set_item_count(item_count),
            Chooser::Latest(c) => c.inner.set_item_count(item_count),
        }
    }

    /// Grow the item count by `delta`, extending any distribution state incrementally.
    pub fn grow_by(&mut self, delta: usize) {
        match self {
            Chooser::Uniform(c) => c.set_item_count(c.item_count + delta),
            Chooser::Zipfian(c) => c.grow_by(delta),
            Chooser::ScatteredZipfian(c) => c.inner.grow_by(delta),
            Chooser::Latest(c) => c.inner.grow_by(delta),
        }
    }

    /// Shrink the item count by `delta`. The count must stay positive.
    pub fn shrink_by(&mut self, delta: usize) {
        match self {
            Chooser::Uniform(c) => c.set_item_count(c.item_count - delta),
            Chooser::Zipfian(c) => c.shrink_by(delta),
            Chooser::ScatteredZipfian(c) => c.inner.shrink_by(delta),
            Chooser::Latest(c) => c.inner.shrink_by(delta),
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            Chooser::Uniform(c) => c.item_count,
            Chooser::Zipfian(c) => c.item_count,
            Chooser::ScatteredZipfian(c) => c.inner.item_count,
            Chooser::Latest(c) => c.inner.item_count,
        }
    }
}

/// Chooses indices uniformly.
#[derive(Clone, Debug)]
pub struct UniformChooser {
    item_count: usize,
    dist: Uniform<usize>,
}

impl UniformChooser {
    pub fn new(item_count: usize) -> Self {
        assert!(item_count > 0, "item count must be positive");
        Self {
            item_count,
            dist: Uniform::new(0, item_count),
        }
    }

    pub fn next(&mut self, rng: &mut impl Rng) -> usize {
        self.dist.sample(rng)
    }

    pub fn set_item_count(&mut self, item_count: usize) {
        assert!(item_count > 0, "item count must be positive");
        self.item_count = item_count;
        self.dist = Uniform::new(0, item_count);
    }
}

/// The Gray et al. bounded Zipfian sampler.
///
/// Precomputes `alpha = 1 / (1 - theta)`, `zeta(2)`, `zeta(n)`, the derived `eta`, and the
/// head threshold `1 + 0.5^theta`. Draw `u ~ U(0, 1)`: if `u * zeta(n) < 1` the result is 0,
/// if `u * zeta(n) < 1 + 0.5^theta` the result is 1, otherwise the continuous approximation
/// `floor(n * (eta * u - eta + 1)^alpha)` is used.
#[derive(Clone, Debug)]
pub struct ZipfianChooser {
    item_count: usize,
    theta: f64,
    alpha: f64,
    thres: f64,
    zeta2theta: f64,
    zeta_n: f64,
    eta: f64,
}

impl ZipfianChooser {
    /// `theta` must lie in the exclusive range (0, 1); the configuration layer enforces this.
    pub fn new(item_count: usize, theta: f64) -> Self {
        assert!(item_count > 0, "item count must be positive");
        let mut chooser = Self {
            item_count,
            theta,
            alpha: 1.0 / (1.0 - theta),
            thres: 1.0 + 0.5f64.powf(theta),
            zeta2theta: zeta::extend(0.0, 0, 2, theta),
            zeta_n: zeta::lookup_or_compute(item_count, theta),
            eta: 0.0,
        };
        chooser.update_eta();
        chooser
    }

    pub fn next(&mut self, rng: &mut impl Rng) -> usize {
        let u: f64 = rng.gen();
        let uz = u * self.zeta_n;
        if uz < 1.0 {
            return 0;
        }
        if uz < self.thres {
            return 1;
        }
        (self.item_count as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as usize
    }

    /// Recompute constants for an arbitrary new item count, preferring a cached `zeta`
    /// starting point.
    pub fn set_item_count(&mut self, item_count: usize) {
        assert!(item_count > 0, "item count must be positive");
        self.item_count = item_count;
        self.zeta_n = zeta::lookup_or_compute(item_count, self.theta);
        self.update_eta();
    }

    /// Extend `zeta(n)` forward by `delta` terms. Cheap for the usual one-key-inserted case.
    pub fn grow_by(&mut self, delta: usize) {
        self.zeta_n = zeta::extend(
            self.zeta_n,
            self.item_count,
            self.item_count + delta,
            self.theta,
        );
        self.item_count += delta;
        self.update_eta();
    }

    /// Drop the last `delta` terms from `zeta(n)`. The count must stay positive.
    pub fn shrink_by(&mut self, delta: usize) {
        assert!(self.item_count > delta, "item count must stay positive");
        self.zeta_n = zeta::shrink(
            self.zeta_n,
            self.item_count,
            self.item_count - delta,
            self.theta,
        );
        self.item_count -= delta;
        self.update_eta();
    }

    fn update_eta(&mut self) {
        self.eta = (1.0 - (2.0 / self.item_count as f64).powf(1.0 - self.theta))
            / (1.0 - self.zeta2theta / self.zeta_n);
    }
}

const FNV_OFFSET_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV_PRIME_64: u64 = 0x100000001b3;

/// 64-bit FNV-1a over the little-endian bytes of `val`.
fn fnv1a_64(val: u64) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    for byte in val.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// A Zipfian chooser whose hot indices are scattered across the range.
///
/// Instances with the same `salt` scatter the hot set identically; change the salt to move
/// the hot keys.
#[derive(Clone, Debug)]
pub struct ScatteredZipfianChooser {
    inner: ZipfianChooser,
    salt: u64,
}

impl ScatteredZipfianChooser {
    pub fn new(item_count: usize, theta: f64, salt: u64) -> Self {
        Self {
            inner: ZipfianChooser::new(item_count, theta),
            salt,
        }
    }

    pub fn next(&mut self, rng: &mut impl Rng) -> usize {
        let hashed = fnv1a_64(self.inner.next(rng) as u64 ^ self.salt);
        // Multiplicative range reduction in place of `hashed % item_count`; see
        // https://lemire.me/blog/2016/06/27/a-fast-alternative-to-the-modulo-reduction/
        ((hashed as u128 * self.inner.item_count as u128) >> 64) as usize
    }
}

/// Biases toward the most recently inserted index: `item_count - 1` is the most popular.
#[derive(Clone, Debug)]
pub struct LatestChooser {
    inner: ZipfianChooser,
}

impl LatestChooser {
    pub fn new(item_count: usize, theta: f64) -> Self {
        Self {
            inner: ZipfianChooser::new(item_count, theta),
        }
    }

    pub fn next(&mut self, rng: &mut impl Rng) -> usize {
        self.inner.item_count - 1 - self.inner.next(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    fn histogram(chooser: &mut Chooser, rng: &mut impl Rng, draws: usize) -> Vec<u64> {
        let mut counts = vec![0u64; chooser.item_count()];
        for _ in 0..draws {
            counts[chooser.next(rng)] += 1;
        }
        counts
    }

    #[test]
    fn uniform_bounds_and_balance() {
        let mut rng = rng(1);
        let mut chooser = Chooser::Uniform(UniformChooser::new(100));
        let counts = histogram(&mut chooser, &mut rng, 1_000_000);
        // 10k expected per index; lottery odds of escaping these bounds
        for c in counts {
            assert!(c > 9_000 && c < 11_000, "unbalanced uniform count: {}", c);
        }
    }

    #[test]
    fn uniform_resize() {
        let mut rng = rng(2);
        let mut chooser = Chooser::Uniform(UniformChooser::new(10));
        chooser.set_item_count(3);
        for _ in 0..1000 {
            assert!(chooser.next(&mut rng) < 3);
        }
        chooser.grow_by(7);
        assert_eq!(chooser.item_count(), 10);
        chooser.shrink_by(9);
        for _ in 0..1000 {
            assert_eq!(chooser.next(&mut rng), 0);
        }
    }

    #[test]
    fn zipfian_head_is_heaviest() {
        let mut rng = rng(3);
        let mut chooser = Chooser::Zipfian(ZipfianChooser::new(1000, 0.9));
        let counts = histogram(&mut chooser, &mut rng, 1_000_000);
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[10]);
        assert!(counts[10] > counts[500]);
        // Index 0 takes zeta-share 1 / zeta(1000, 0.9), roughly 7.8%.
        assert!(counts[0] as f64 > 0.05 * 1_000_000.0);
    }

    #[test]
    fn zipfian_stays_in_range() {
        let mut rng = rng(4);
        let mut chooser = ZipfianChooser::new(10, 0.99);
        for _ in 0..100_000 {
            assert!(chooser.next(&mut rng) < 10);
        }
    }

    #[test]
    fn zipfian_grow_matches_fresh_build() {
        // Growing term by term accumulates zeta in the same order as building from scratch,
        // so the distribution constants must agree exactly.
        let theta = 0.61;
        let mut grown = ZipfianChooser::new(900, theta);
        grown.grow_by(100);
        let fresh = ZipfianChooser::new(1000, theta);
        assert_eq!(grown.zeta_n.to_bits(), fresh.zeta_n.to_bits());
        assert_eq!(grown.eta.to_bits(), fresh.eta.to_bits());
    }

    #[test]
    fn zipfian_shrink_then_grow_roundtrips() {
        let theta = 0.87;
        let reference = ZipfianChooser::new(512, theta);
        let mut chooser = ZipfianChooser::new(512, theta);
        chooser.shrink_by(12);
        assert_eq!(chooser.item_count, 500);
        chooser.grow_by(12);
        assert!((chooser.zeta_n - reference.zeta_n).abs() < 1e-9);
    }

    #[test]
    fn scattered_same_salt_same_mapping() {
        let mut a = ScatteredZipfianChooser::new(10_000, 0.9, 7);
        let mut b = ScatteredZipfianChooser::new(10_000, 0.9, 7);
        let mut rng_a = rng(5);
        let mut rng_b = rng(5);
        for _ in 0..10_000 {
            assert_eq!(a.next(&mut rng_a), b.next(&mut rng_b));
        }
    }

    #[test]
    fn scattered_salt_moves_hot_keys() {
        let mut rng_a = rng(6);
        let mut rng_b = rng(6);
        let mut a = Chooser::ScatteredZipfian(ScatteredZipfianChooser::new(10_000, 0.99, 0));
        let mut b = Chooser::ScatteredZipfian(ScatteredZipfianChooser::new(10_000, 0.99, 1));
        let counts_a = histogram(&mut a, &mut rng_a, 200_000);
        let counts_b = histogram(&mut b, &mut rng_b, 200_000);
        let top = |counts: &[u64]| {
            let mut order: Vec<usize> = (0..counts.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(counts[i]));
            order.truncate(10);
            order
        };
        let top_a = top(&counts_a);
        let top_b = top(&counts_b);
        let overlap = top_a.iter().filter(|i| top_b.contains(i)).count();
        assert!(overlap <= 2, "salts share {} of 10 hot keys", overlap);
    }

    #[test]
    fn latest_favors_highest_index() {
        let mut rng = rng(7);
        let mut chooser = Chooser::Latest(LatestChooser::new(1000, 0.9));
        let counts = histogram(&mut chooser, &mut rng, 1_000_000);
        assert!(counts[999] > counts[998]);
        assert!(counts[999] > counts[0]);
    }
}
