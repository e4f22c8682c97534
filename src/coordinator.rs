//! Shared coordination state for the producers of one workload run.
//!
//! All producers of a run see the same initial dataset, and deletes issued by any producer
//! against a load key must be visible to every other producer so that a deleted key is never
//! chosen again. The coordinator owns the sorted load-key vector and the load-deletion index,
//! guarded by a single interior mutex. Producers hold the coordinator by `Arc`; per-producer
//! insert bookkeeping stays producer-local and unlocked.

use std::collections::BTreeMap;

use parking_lot::{Mutex, MutexGuard};

use crate::Key;

/// Maps the physical index of a deleted key to its deletion ordinal (1-based, in deletion
/// order).
pub(crate) type DeletionMap = BTreeMap<usize, usize>;

/// Translate a logical index within the live (non-deleted) sequence into a physical index
/// into the backing vector.
///
/// Iterates `physical = logical + |deletions at or below physical|` to its least fixpoint,
/// skipping one slot for every deletion that precedes the candidate.
pub(crate) fn logical_to_physical(deletions: &DeletionMap, logical: usize) -> usize {
    let mut physical = logical;
    loop {
        let skipped = deletions.range(..=physical).count();
        let candidate = logical + skipped;
        if candidate == physical {
            return physical;
        }
        physical = candidate;
    }
}

#[derive(Debug, Default)]
struct CoordState {
    load_deletions: DeletionMap,
}

/// Shared handle over the load-key space of a run.
#[derive(Debug)]
pub struct WorkloadCoordinator {
    /// The initial dataset's keys, tagged and in ascending order. Immutable for the whole
    /// run; only the deletion index mutates.
    load_keys: Vec<Key>,
    state: Mutex<CoordState>,
}

impl WorkloadCoordinator {
    pub(crate) fn new(load_keys: Vec<Key>) -> Self {
        Self {
            load_keys,
            state: Mutex::new(CoordState::default()),
        }
    }

    /// Total number of initially loaded keys, deleted or not.
    pub fn num_load_keys(&self) -> usize {
        self.load_keys.len()
    }

    pub(crate) fn lock(&self) -> CoordGuard<'_> {
        CoordGuard {
            load_keys: &self.load_keys,
            state: self.state.lock(),
        }
    }
}

/// Exclusive access to the coordination state for the duration of one key choice.
pub(crate) struct CoordGuard<'a> {
    load_keys: &'a [Key],
    state: MutexGuard<'a, CoordState>,
}

impl CoordGuard<'_> {
    /// Number of load keys that have not been deleted.
    pub(crate) fn live_load_count(&self) -> usize {
        self.load_keys.len() - self.state.load_deletions.len()
    }

    pub(crate) fn num_deletions(&self) -> usize {
        self.state.load_deletions.len()
    }

    /// The `logical`-th live load key.
    pub(crate) fn key_at_logical(&self, logical: usize) -> Key {
        let physical = logical_to_physical(&self.state.load_deletions, logical);
        self.load_keys[physical]
    }

    /// The `logical`-th live load key, additionally marking it deleted. It will not be
    /// returned by any later lookup.
    pub(crate) fn delete_at_logical(&mut self, logical: usize) -> Key {
        let physical = logical_to_physical(&self.state.load_deletions, logical);
        let ordinal = self.state.load_deletions.len() + 1;
        self.state.load_deletions.insert(physical, ordinal);
        self.load_keys[physical]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deletions(indices: &[usize]) -> DeletionMap {
        indices
            .iter()
            .enumerate()
            .map(|(ordinal, physical)| (*physical, ordinal + 1))
            .collect()
    }

    fn brute_force(len: usize, deleted: &[usize], logical: usize) -> usize {
        (0..len)
            .filter(|i| !deleted.contains(i))
            .nth(logical)
            .unwrap()
    }

    #[test]
    fn walk_with_no_deletions() {
        let map = DeletionMap::new();
        for logical in 0..10 {
            assert_eq!(logical_to_physical(&map, logical), logical);
        }
    }

    #[test]
    fn walk_skips_deleted_slots() {
        let map = deletions(&[0, 2, 3, 7]);
        for logical in 0..6 {
            assert_eq!(
                logical_to_physical(&map, logical),
                brute_force(10, &[0, 2, 3, 7], logical)
            );
        }
    }

    #[test]
    fn walk_matches_brute_force_on_random_patterns() {
        // Deterministic pseudo-random deletion patterns over a small vector.
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..100 {
            let len = 32;
            let mut deleted: Vec<usize> = (0..len).filter(|_| next() % 3 == 0).collect();
            deleted.truncate(len - 1);
            let map = deletions(&deleted);
            let live = len - deleted.len();
            for logical in 0..live {
                assert_eq!(
                    logical_to_physical(&map, logical),
                    brute_force(len, &deleted, logical)
                );
            }
        }
    }

    #[test]
    fn coordinator_delete_bookkeeping() {
        let coordinator = WorkloadCoordinator::new(vec![10, 20, 30, 40, 50]);
        assert_eq!(coordinator.num_load_keys(), 5);
        {
            let mut guard = coordinator.lock();
            assert_eq!(guard.live_load_count(), 5);
            assert_eq!(guard.key_at_logical(2), 30);
            assert_eq!(guard.delete_at_logical(2), 30);
            assert_eq!(guard.live_load_count(), 4);
            // Logical index 2 now resolves past the deleted slot.
            assert_eq!(guard.key_at_logical(2), 40);
            assert_eq!(guard.delete_at_logical(0), 10);
            assert_eq!(guard.live_load_count(), 3);
            assert_eq!(guard.key_at_logical(0), 20);
            assert_eq!(guard.num_deletions(), 2);
        }
        // Total load keys are unaffected by deletion.
        assert_eq!(coordinator.num_load_keys(), 5);
    }
}
