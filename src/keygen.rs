//! Bulk key-batch generators.
//!
//! Generators synthesize the raw (untagged) keys that make up the initial load dataset and the
//! per-phase insert lists. Unlike [choosers](crate::chooser), which pick indices out of a dense
//! live range, a generator fills a caller-owned buffer with a fixed number of keys drawn from a
//! configured key range in one shot, before the benchmark runs.

use hashbrown::HashSet;
use rand::Rng;

use crate::error::Error;
use crate::{Key, MAX_KEY};

/// An inclusive key range `[min, max]` with both bounds at most `2^48 - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRange {
    min: Key,
    max: Key,
}

impl KeyRange {
    pub fn new(min: Key, max: Key) -> Result<Self, Error> {
        if min > max {
            return Err(Error::config(format!(
                "invalid key range: min {} is greater than max {}",
                min, max
            )));
        }
        if max > MAX_KEY {
            return Err(Error::config("key values cannot exceed 2^48 - 1"));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Key {
        self.min
    }

    pub fn max(&self) -> Key {
        self.max
    }

    /// Number of keys in the range.
    pub fn size(&self) -> u64 {
        self.max - self.min + 1
    }

    pub fn contains(&self, key: Key) -> bool {
        key >= self.min && key <= self.max
    }
}

/// A bulk key generator over a named distribution.
#[derive(Clone, Debug)]
pub enum Generator {
    Uniform(UniformGenerator),
    Hotspot(HotspotGenerator),
    Linspace(LinspaceGenerator),
}

impl Generator {
    pub fn num_keys(&self) -> usize {
        match self {
            Generator::Uniform(g) => g.num_keys,
            Generator::Hotspot(g) => g.num_keys,
            Generator::Linspace(g) => g.num_keys,
        }
    }

    /// Fill `dest` with exactly `num_keys` raw keys. `dest.len()` must equal `num_keys`.
    pub fn generate_into(&self, rng: &mut impl Rng, dest: &mut [Key]) {
        debug_assert_eq!(dest.len(), self.num_keys());
        match self {
            Generator::Uniform(g) => g.generate_into(rng, dest),
            Generator::Hotspot(g) => g.generate_into(rng, dest),
            Generator::Linspace(g) => g.generate_into(rng, dest),
        }
    }
}

/// Generates `num_keys` *distinct* keys chosen uniformly from a range.
///
/// The output order is unspecified.
#[derive(Clone, Debug)]
pub struct UniformGenerator {
    num_keys: usize,
    range: KeyRange,
}

impl UniformGenerator {
    pub fn new(num_keys: usize, range: KeyRange) -> Result<Self, Error> {
        if (num_keys as u64) > range.size() {
            return Err(Error::config(format!(
                "cannot draw {} distinct keys from a range of {}",
                num_keys,
                range.size()
            )));
        }
        Ok(Self { num_keys, range })
    }

    fn generate_into(&self, rng: &mut impl Rng, dest: &mut [Key]) {
        let size = self.range.size();
        if self.num_keys as u64 * 2 > size {
            // Dense request: rejection sampling would thrash, so materialize the range and
            // take a partial Fisher-Yates shuffle instead.
            let mut pool: Vec<Key> = (self.range.min..=self.range.max).collect();
            for (i, slot) in dest.iter_mut().enumerate() {
                let j = rng.gen_range(i..pool.len());
                pool.swap(i, j);
                *slot = pool[i];
            }
        } else {
            let mut seen = HashSet::with_capacity(self.num_keys);
            for slot in dest.iter_mut() {
                loop {
                    let key = rng.gen_range(self.range.min..=self.range.max);
                    if seen.insert(key) {
                        *slot = key;
                        break;
                    }
                }
            }
        }
    }
}

/// A mixture distribution: each key lands in a hot sub-range with a configured probability,
/// otherwise uniformly in the remainder of the overall range. Keys are not deduplicated.
#[derive(Clone, Debug)]
pub struct HotspotGenerator {
    num_keys: usize,
    hot_proportion_pct: u32,
    overall: KeyRange,
    hot: KeyRange,
}

impl HotspotGenerator {
    pub fn new(
        num_keys: usize,
        hot_proportion_pct: u32,
        overall: KeyRange,
        hot: KeyRange,
    ) -> Result<Self, Error> {
        if hot_proportion_pct > 100 {
            return Err(Error::config("hot proportion must be at most 100"));
        }
        if !overall.contains(hot.min) || !overall.contains(hot.max) {
            return Err(Error::config(
                "the hot range must be contained in the overall range",
            ));
        }
        if overall.size() == hot.size() && hot_proportion_pct < 100 {
            return Err(Error::config(
                "the hot range covers the whole overall range, leaving nothing cold",
            ));
        }
        Ok(Self {
            num_keys,
            hot_proportion_pct,
            overall,
            hot,
        })
    }

    fn generate_into(&self, rng: &mut impl Rng, dest: &mut [Key]) {
        let cold_size = self.overall.size() - self.hot.size();
        for slot in dest.iter_mut() {
            if rng.gen_range(0..100u32) < self.hot_proportion_pct {
                *slot = rng.gen_range(self.hot.min..=self.hot.max);
            } else {
                // Uniform over the overall range minus the hot range: draw an offset into the
                // cold key count and skip over the hot span.
                let offset = rng.gen_range(0..cold_size);
                let candidate = self.overall.min + offset;
                *slot = if candidate >= self.hot.min {
                    candidate + self.hot.size()
                } else {
                    candidate
                };
            }
        }
    }
}

/// Evenly spaced keys: `keys[i] = start_key + i * step_size`.
#[derive(Clone, Debug)]
pub struct LinspaceGenerator {
    num_keys: usize,
    start_key: Key,
    step_size: u64,
}

impl LinspaceGenerator {
    pub fn new(num_keys: usize, start_key: Key, step_size: u64) -> Result<Self, Error> {
        let last = (num_keys as u64)
            .checked_sub(1)
            .unwrap_or(0)
            .checked_mul(step_size)
            .and_then(|span| start_key.checked_add(span));
        match last {
            Some(last) if last <= MAX_KEY => Ok(Self {
                num_keys,
                start_key,
                step_size,
            }),
            _ => Err(Error::config(
                "linspace sequence would exceed the maximum key of 2^48 - 1",
            )),
        }
    }

    fn generate_into(&self, _rng: &mut impl Rng, dest: &mut [Key]) {
        for (i, slot) in dest.iter_mut().enumerate() {
            *slot = self.start_key + i as u64 * self.step_size;
        }
    }
}
