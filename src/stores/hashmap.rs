//! Adapter implementation of [`hashbrown::HashMap`]. Internally sharded.
//!
//! Hash maps are unordered, so range scans are unsupported and always report failure.
//!
//! ## Configuration Format
//!
//! ### [`Mutex`]-based:
//!
//! ```toml
//! [map]
//! name = "mutex_hashmap"
//! shards = ... # number of shards
//! ```
//!
//! ### [`RwLock`]-based:
//!
//! ```toml
//! [map]
//! name = "rwlock_hashmap"
//! shards = ... # number of shards
//! ```

use std::hash::Hasher;
use std::sync::Arc;

use ahash::AHasher;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;

use crate::error::Error;
use crate::stores::{BenchStore, Registry};
use crate::{DatabaseInterface, Key};

/// Calculate the shard of a key using [`AHasher`].
fn shard(key: Key, nr_shards: usize) -> usize {
    let mut hasher = AHasher::default();
    hasher.write_u64(key);
    hasher.finish() as usize % nr_shards
}

type BaseHashMap = HashMap<Key, Vec<u8>>;

#[derive(Deserialize)]
pub struct HashMapOpt {
    pub shards: usize,
}

// {{{ mutex_hashmap

#[derive(Clone)]
pub struct MutexHashMap {
    nr_shards: usize,
    shards: Arc<Vec<Mutex<BaseHashMap>>>,
}

impl MutexHashMap {
    pub fn new(opt: &HashMapOpt) -> Self {
        let nr_shards = opt.shards;
        let mut shards = Vec::with_capacity(nr_shards);
        for _ in 0..nr_shards {
            shards.push(Mutex::new(BaseHashMap::new()));
        }
        Self {
            nr_shards,
            shards: Arc::new(shards),
        }
    }

    pub fn new_benchstore(opt: &toml::Table) -> Result<BenchStore, Error> {
        let opt: HashMapOpt = opt
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| Error::config(e.to_string()))?;
        Ok(Box::new(Self::new(&opt)))
    }
}

impl DatabaseInterface for MutexHashMap {
    fn read(&self, key: Key, value_out: &mut Vec<u8>) -> bool {
        let sid = shard(key, self.nr_shards);
        match self.shards[sid].lock().get(&key) {
            Some(value) => {
                value_out.clear();
                value_out.extend_from_slice(value);
                true
            }
            None => false,
        }
    }

    fn insert(&self, key: Key, value: &[u8]) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].lock().insert(key, value.to_vec());
        true
    }

    fn update(&self, key: Key, value: &[u8]) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].lock().insert(key, value.to_vec());
        true
    }

    fn delete(&self, key: Key) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].lock().remove(&key).is_some()
    }

    fn scan(&self, _key: Key, _amount: u64, _out: &mut Vec<(Key, Vec<u8>)>) -> bool {
        false
    }
}

inventory::submit! {
    Registry::new("mutex_hashmap", MutexHashMap::new_benchstore)
}

// }}} mutex_hashmap

// {{{ rwlock_hashmap

#[derive(Clone)]
pub struct RwLockHashMap {
    nr_shards: usize,
    shards: Arc<Vec<RwLock<BaseHashMap>>>,
}

impl RwLockHashMap {
    pub fn new(opt: &HashMapOpt) -> Self {
        let nr_shards = opt.shards;
        let mut shards = Vec::with_capacity(nr_shards);
        for _ in 0..nr_shards {
            shards.push(RwLock::new(BaseHashMap::new()));
        }
        Self {
            nr_shards,
            shards: Arc::new(shards),
        }
    }

    pub fn new_benchstore(opt: &toml::Table) -> Result<BenchStore, Error> {
        let opt: HashMapOpt = opt
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| Error::config(e.to_string()))?;
        Ok(Box::new(Self::new(&opt)))
    }
}

impl DatabaseInterface for RwLockHashMap {
    fn read(&self, key: Key, value_out: &mut Vec<u8>) -> bool {
        let sid = shard(key, self.nr_shards);
        match self.shards[sid].read().get(&key) {
            Some(value) => {
                value_out.clear();
                value_out.extend_from_slice(value);
                true
            }
            None => false,
        }
    }

    fn insert(&self, key: Key, value: &[u8]) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].write().insert(key, value.to_vec());
        true
    }

    fn update(&self, key: Key, value: &[u8]) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].write().insert(key, value.to_vec());
        true
    }

    fn delete(&self, key: Key) -> bool {
        let sid = shard(key, self.nr_shards);
        self.shards[sid].write().remove(&key).is_some()
    }

    fn scan(&self, _key: Key, _amount: u64, _out: &mut Vec<(Key, Vec<u8>)>) -> bool {
        false
    }
}

inventory::submit! {
    Registry::new("rwlock_hashmap", RwLockHashMap::new_benchstore)
}

// }}} rwlock_hashmap
