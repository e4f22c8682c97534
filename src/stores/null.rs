use crate::error::Error;
use crate::stores::{BenchStore, Registry};
use crate::{DatabaseInterface, Key};

/// NullStore does nothing. It can be used to measure the overhead of the harness itself.
///
/// Writes and deletes succeed without storing anything; reads miss.
///
/// ## Configuration Format
///
/// ```toml
/// [map]
/// name = "null"
/// ```
#[derive(Clone, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }

    pub fn new_benchstore(_opt: &toml::Table) -> Result<BenchStore, Error> {
        Ok(Box::new(Self::new()))
    }
}

impl DatabaseInterface for NullStore {
    fn read(&self, _key: Key, _value_out: &mut Vec<u8>) -> bool {
        false
    }

    fn insert(&self, _key: Key, _value: &[u8]) -> bool {
        true
    }

    fn update(&self, _key: Key, _value: &[u8]) -> bool {
        true
    }

    fn delete(&self, _key: Key) -> bool {
        true
    }

    fn scan(&self, _key: Key, _amount: u64, _out: &mut Vec<(Key, Vec<u8>)>) -> bool {
        true
    }
}

inventory::submit! {
    Registry::new("null", NullStore::new_benchstore)
}
