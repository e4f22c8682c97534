//! Adapter implementation of [`std::collections::BTreeMap`].
//!
//! The map is ordered, so this is the only built-in store that supports range scans.
//!
//! ## Configuration Format
//!
//! ```toml
//! [map]
//! name = "mutex_btreemap"
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::stores::{BenchStore, Registry};
use crate::{DatabaseInterface, Key};

#[derive(Clone, Default)]
pub struct MutexBTreeMap(Arc<Mutex<BTreeMap<Key, Vec<u8>>>>);

impl MutexBTreeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_benchstore(_opt: &toml::Table) -> Result<BenchStore, Error> {
        Ok(Box::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl DatabaseInterface for MutexBTreeMap {
    fn bulk_load(&self, load: &crate::trace::BulkLoadTrace) -> bool {
        let mut map = self.0.lock();
        for req in load.iter() {
            let value = req.value.as_deref().unwrap_or(&[]);
            map.insert(req.key, value.to_vec());
        }
        true
    }

    fn read(&self, key: Key, value_out: &mut Vec<u8>) -> bool {
        match self.0.lock().get(&key) {
            Some(value) => {
                value_out.clear();
                value_out.extend_from_slice(value);
                true
            }
            None => false,
        }
    }

    fn insert(&self, key: Key, value: &[u8]) -> bool {
        self.0.lock().insert(key, value.to_vec());
        true
    }

    fn update(&self, key: Key, value: &[u8]) -> bool {
        self.0.lock().insert(key, value.to_vec());
        true
    }

    fn delete(&self, key: Key) -> bool {
        self.0.lock().remove(&key).is_some()
    }

    fn scan(&self, key: Key, amount: u64, out: &mut Vec<(Key, Vec<u8>)>) -> bool {
        out.clear();
        let map = self.0.lock();
        for (k, v) in map.range(key..).take(amount as usize) {
            out.push((*k, v.clone()));
        }
        true
    }
}

inventory::submit! {
    Registry::new("mutex_btreemap", MutexBTreeMap::new_benchstore)
}
