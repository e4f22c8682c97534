//! A process-wide cache of the Zipfian normalization constant `zeta(n, theta)`.
//!
//! Computing `zeta(n) = sum_{i=1..n} i^-theta` from scratch is linear in `n`, which hurts when
//! choosers over large item counts are built repeatedly (one per operation per phase per
//! producer). The cache memoizes every computed value per `theta` so later requests extend the
//! partial sum from the nearest cached point instead of starting over.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use hashbrown::HashMap;
use parking_lot::Mutex;

// Keyed by theta's bit pattern. Theta values come straight from the workload configuration,
// never from arithmetic, so bitwise identity is the right notion of equality here.
type Cache = HashMap<u64, BTreeMap<usize, f64>>;

static CACHE: OnceLock<Mutex<Cache>> = OnceLock::new();

fn cache() -> &'static Mutex<Cache> {
    CACHE.get_or_init(|| Mutex::new(Cache::new()))
}

/// Extend `zeta(from, theta)` to `zeta(to, theta)` by accumulating the terms for item counts
/// `from + 1` through `to`, in ascending order.
///
/// The term-by-term accumulation onto the base value keeps the result bit-identical to a
/// from-scratch computation, so cached and uncached paths agree exactly.
pub(crate) fn extend(mut zeta: f64, from: usize, to: usize, theta: f64) -> f64 {
    debug_assert!(from <= to);
    for i in from..to {
        zeta += 1.0 / ((i + 1) as f64).powf(theta);
    }
    zeta
}

/// Shrink `zeta(from, theta)` down to `zeta(to, theta)` by subtracting the tail terms, in
/// ascending order.
pub(crate) fn shrink(mut zeta: f64, from: usize, to: usize, theta: f64) -> f64 {
    debug_assert!(to <= from);
    for i in to..from {
        zeta -= 1.0 / ((i + 1) as f64).powf(theta);
    }
    zeta
}

/// Return `zeta(item_count, theta)`, consulting and feeding the process-wide cache.
///
/// A cache hit is returned bit-identically. On a miss, the sum is extended forward from the
/// largest cached item count below `item_count`, or backward (by subtracting tail terms) from
/// the smallest cached item count above it, whichever exists; the result is then memoized.
/// Entries are write-once: concurrent duplicate computations are tolerated but the first
/// stored value wins.
pub(crate) fn lookup_or_compute(item_count: usize, theta: f64) -> f64 {
    let starting_point = find_starting_point(item_count, theta);
    if let Some((n, zeta_n)) = starting_point {
        if n == item_count {
            return zeta_n;
        }
    }

    // Compute outside the lock; this may take a while for large deltas.
    let zeta = match starting_point {
        Some((n, zeta_n)) if n < item_count => extend(zeta_n, n, item_count, theta),
        Some((n, zeta_n)) => shrink(zeta_n, n, item_count, theta),
        None => extend(0.0, 0, item_count, theta),
    };

    let mut guard = cache().lock();
    let theta_map = guard.entry(theta.to_bits()).or_default();
    *theta_map.entry(item_count).or_insert(zeta)
}

/// Find the best cached starting point for computing `zeta(item_count, theta)`: the exact
/// entry if present, else the nearest entry below, else the nearest entry above.
fn find_starting_point(item_count: usize, theta: f64) -> Option<(usize, f64)> {
    let guard = cache().lock();
    let theta_map = guard.get(&theta.to_bits())?;
    if let Some(zeta_n) = theta_map.get(&item_count) {
        return Some((item_count, *zeta_n));
    }
    if let Some((n, zeta_n)) = theta_map.range(..item_count).next_back() {
        return Some((*n, *zeta_n));
    }
    theta_map
        .range(item_count..)
        .next()
        .map(|(n, zeta_n)| (*n, *zeta_n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_equals_extension() {
        // Extending a partial sum must match the from-scratch sum bit for bit, since both
        // accumulate terms onto the same base in the same ascending order.
        let theta = 0.77;
        let direct = extend(0.0, 0, 10_000, theta);
        let extended = extend(extend(0.0, 0, 6_000, theta), 6_000, 10_000, theta);
        assert_eq!(direct.to_bits(), extended.to_bits());
    }

    #[test]
    fn cache_hit_is_bit_identical() {
        let theta = 0.99;
        let first = lookup_or_compute(12_345, theta);
        let second = lookup_or_compute(12_345, theta);
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn extension_from_smaller_entry() {
        let theta = 0.42;
        let small = lookup_or_compute(1_000, theta);
        let large = lookup_or_compute(2_000, theta);
        assert!(large > small);
        assert_eq!(large.to_bits(), extend(0.0, 0, 2_000, theta).to_bits());
    }

    #[test]
    fn backward_extension_approximates_direct() {
        // Force a cache state where only a larger item count is known, then ask for a smaller
        // one. Subtracting tail terms loses a little precision, so compare approximately.
        let theta = 0.512;
        let _ = lookup_or_compute(5_000, theta);
        let smaller = lookup_or_compute(3_000, theta);
        let direct = extend(0.0, 0, 3_000, theta);
        assert!((smaller - direct).abs() < 1e-9);
    }

    #[test]
    fn thetas_do_not_interfere() {
        let a = lookup_or_compute(500, 0.2);
        let b = lookup_or_compute(500, 0.8);
        assert!(a > b);
        assert_eq!(a, lookup_or_compute(500, 0.2));
        assert_eq!(b, lookup_or_compute(500, 0.8));
    }
}
