//! Built-in stores and the store registry.
//!
//! ## Configuration Format
//!
//! The configuration of a store under test lives in a dictionary named `map`:
//!
//! ```toml
//! [map]
//! name = "..."
//! # option1 = ...
//! # option2 = ...
//! ```
//!
//! The field `name` must be given and it should be equal to the name registered by the store.
//! All other fields are handed over to the store's constructor function as a TOML table. For
//! available options other than `name`, refer to the module-level documentation of a specific
//! store.
//!
//! Options in a `[map]` section can also be overridden via environment variables: setting
//! `map.x` overrides `x`.
//!
//! ## Registering New Stores
//!
//! To benchmark your own store through the command line, implement
//! [`DatabaseInterface`](crate::DatabaseInterface) for it, write a constructor with the
//! signature `fn(&toml::Table) -> Result<Box<dyn DatabaseInterface>, Error>`, and register it
//! with [`inventory`]: `inventory::submit! { Registry::new("name", constructor_fn) };`. The
//! built-in stores are good examples of this process.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use hashbrown::HashMap;
use log::debug;
use serde::Deserialize;
use toml::Table;

use crate::error::Error;
use crate::DatabaseInterface;

/// A store under test, type-erased for registry construction.
pub type BenchStore = Box<dyn DatabaseInterface>;

/// The centralized registry mapping store names to their constructor functions.
///
/// A user-defined store can use the [`inventory::submit!`] macro to register itself to be
/// used with the benchmark command line.
pub struct Registry {
    pub(crate) name: &'static str,
    constructor: fn(&Table) -> Result<BenchStore, Error>,
}

impl Registry {
    pub const fn new(
        name: &'static str,
        constructor: fn(&Table) -> Result<BenchStore, Error>,
    ) -> Self {
        Self { name, constructor }
    }
}

inventory::collect!(Registry);

/// The `[map]` section of a store configuration.
#[derive(Deserialize, Clone, Debug)]
pub(crate) struct BenchStoreOpt {
    name: String,
    #[serde(flatten)]
    opt: Table,
}

/// Construct the store named by a configuration string.
pub fn build_from_toml_str(text: &str) -> Result<BenchStore, Error> {
    #[derive(Deserialize)]
    struct StoreConfig {
        map: BenchStoreOpt,
    }
    let config: StoreConfig = Figment::new()
        .merge(Toml::string(text))
        .merge(Env::raw())
        .extract()
        .map_err(|e| Error::config(e.to_string()))?;
    build(&config.map)
}

pub(crate) fn build(opt: &BenchStoreOpt) -> Result<BenchStore, Error> {
    let mut registered: HashMap<&'static str, fn(&Table) -> Result<BenchStore, Error>> =
        HashMap::new();
    for r in inventory::iter::<Registry> {
        debug!("Adding supported store: {}", r.name);
        assert!(
            registered.insert(r.name, r.constructor).is_none(),
            "duplicate store name in registry"
        );
    }
    let constructor = registered
        .get(opt.name.as_str())
        .ok_or_else(|| Error::config(format!("store {} not found in registry", opt.name)))?;
    constructor(&opt.opt)
}

pub mod btreemap;
pub mod hashmap;
pub mod null;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_known_stores() {
        for name in ["null", "mutex_btreemap", "mutex_hashmap", "rwlock_hashmap"] {
            let text = format!(
                "[map]\nname = \"{}\"\nshards = 4\n",
                name
            );
            let store = build_from_toml_str(&text).unwrap();
            assert!(store.insert(1, b"value"));
        }
    }

    #[test]
    fn unknown_store_is_rejected() {
        assert!(build_from_toml_str("[map]\nname = \"no_such_store\"\n").is_err());
    }
}
