//! A multi-threaded workload generator and benchmark harness for key-value stores, modeled
//! after YCSB.
//!
//! With `phasebench`, you can describe a benchmark as a sequence of *phases* in the TOML format:
//! the proportions of mixed operations, the key access distributions, the number of requests,
//! and the insert/delete behavior of each phase, just to name a few. Workloads are synthesized
//! deterministically per seed and dispatched across worker threads, each driving its own request
//! stream against the store under test while recording latency and throughput metrics.
//!
//! You can benchmark your own key-value store by implementing the [`DatabaseInterface`] trait
//! and handing it to a [`session::Session`]. Alternatively, register the store in the
//! [`stores`] registry and reuse the exported [`cmdline()`] in your `main` function to get a
//! fully working benchmark binary.
//!
//! More detailed usage could be found in the module-level rustdocs.

use std::sync::Arc;

use crate::trace::BulkLoadTrace;

/// A 64-bit request key.
///
/// Only the upper 48 bits carry the logical key drawn from a distribution; the lower 16 bits
/// are a tag `(phase_tag << 8) | producer_tag` labeling the origin of the key. The initial
/// load uses tag `(0, 0)`; inserts made during phase `p` by producer `i` use
/// `(p + 1, i + 1)`.
pub type Key = u64;

/// The largest logical key value that can be tagged without overflow.
pub const MAX_KEY: Key = (1 << 48) - 1;

/// The kind of a single request issued against the store under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Point lookup of a key that is expected to exist.
    Read,
    /// Point lookup of a key that is guaranteed to not exist.
    NegativeRead,
    /// Blind write to an existing key.
    Update,
    /// Write of a new key.
    Insert,
    /// Forward range scan starting at a key.
    Scan,
    /// A read of a key followed by an update of the same key.
    ReadModifyWrite,
    /// Removal of an existing key.
    Delete,
}

/// A single synthesized request.
///
/// `scan_amount` is at least 1 when `op` is [`Operation::Scan`] and 0 otherwise. `value` is
/// present for inserts, updates, and read-modify-writes; it points into the producer's cyclic
/// value pool, so payloads repeat and should be treated as opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub op: Operation,
    pub key: Key,
    pub scan_amount: u64,
    pub value: Option<Arc<[u8]>>,
}

impl Request {
    pub(crate) fn new(op: Operation, key: Key) -> Self {
        Self {
            op,
            key,
            scan_amount: 0,
            value: None,
        }
    }
}

/// The store under test.
///
/// The storage engine is an external collaborator: `phasebench` only consumes this interface.
/// All methods take `&self`; implementations are expected to manage their own interior
/// synchronization as they will be called concurrently from all worker threads.
///
/// Each operation returns `true` on success. A `false` return is counted as a failed
/// operation, or aborts the run when [`RunOptions::expect_request_success`] is set.
pub trait DatabaseInterface: Send + Sync + 'static {
    /// Called once per worker thread when it starts, before any requests are issued.
    fn initialize_worker(&self, _worker_id: usize) {}

    /// Called exactly once, on a single worker, before the benchmark runs.
    fn initialize_database(&self) {}

    /// Called once per worker thread when the session shuts down.
    fn shutdown_worker(&self, _worker_id: usize) {}

    /// Called once when the session terminates, after all workers have drained.
    fn shutdown_database(&self) {}

    /// Load an initial dataset. Always invoked on a single thread.
    ///
    /// The default implementation inserts every record in the trace one by one; stores with a
    /// faster ingestion path should override it.
    fn bulk_load(&self, load: &BulkLoadTrace) -> bool {
        for req in load.iter() {
            let value = req.value.as_deref().unwrap_or(&[]);
            if !self.insert(req.key, value) {
                return false;
            }
        }
        true
    }

    /// Retrieve the value of `key` into `value_out`.
    fn read(&self, key: Key, value_out: &mut Vec<u8>) -> bool;

    /// Write a new key-value pair.
    fn insert(&self, key: Key, value: &[u8]) -> bool;

    /// Blindly update the value of an existing key.
    fn update(&self, key: Key, value: &[u8]) -> bool;

    /// Remove a key.
    fn delete(&self, key: Key) -> bool;

    /// Scan `amount` records in ascending key order starting at `key` into `out`.
    fn scan(&self, key: Key, amount: u64, out: &mut Vec<(Key, Vec<u8>)>) -> bool;
}

impl DatabaseInterface for Box<dyn DatabaseInterface> {
    fn initialize_worker(&self, worker_id: usize) {
        (**self).initialize_worker(worker_id)
    }

    fn initialize_database(&self) {
        (**self).initialize_database()
    }

    fn shutdown_worker(&self, worker_id: usize) {
        (**self).shutdown_worker(worker_id)
    }

    fn shutdown_database(&self) {
        (**self).shutdown_database()
    }

    fn bulk_load(&self, load: &BulkLoadTrace) -> bool {
        (**self).bulk_load(load)
    }

    fn read(&self, key: Key, value_out: &mut Vec<u8>) -> bool {
        (**self).read(key, value_out)
    }

    fn insert(&self, key: Key, value: &[u8]) -> bool {
        (**self).insert(key, value)
    }

    fn update(&self, key: Key, value: &[u8]) -> bool {
        (**self).update(key, value)
    }

    fn delete(&self, key: Key) -> bool {
        (**self).delete(key)
    }

    fn scan(&self, key: Key, amount: u64, out: &mut Vec<(Key, Vec<u8>)>) -> bool {
        (**self).scan(key, amount, out)
    }
}

/// One deterministic request stream, owned by one worker thread.
///
/// [`prepare`](WorkloadProducer::prepare) runs on the worker before the benchmark timer
/// starts; it may be expensive. After that, the executor drains the producer with
/// [`next`](WorkloadProducer::next) until [`has_next`](WorkloadProducer::has_next) returns
/// false.
pub trait WorkloadProducer: Send + 'static {
    fn prepare(&mut self) -> Result<(), Error>;

    fn has_next(&self) -> bool;

    /// Produce the next request. Must only be called while `has_next` returns true.
    fn next(&mut self) -> Request;
}

/// A benchmark workload that can be split into per-worker producers.
pub trait Workload {
    type Producer: WorkloadProducer;

    /// Split the workload into `num_producers` independent producers, one per worker thread.
    fn producers(&self, num_producers: usize) -> Result<Vec<Self::Producer>, Error>;
}

/// Options controlling how a workload run is measured and checked.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Every `latency_sample_period`-th request is bracketed with a monotonic clock and its
    /// latency recorded. 1 means every request is timed.
    pub latency_sample_period: u64,
    /// Every `throughput_sample_period` requests, a throughput sample row is appended to the
    /// per-executor sample file. 0 disables throughput sampling.
    pub throughput_sample_period: u64,
    /// Directory where throughput sample files are created.
    pub output_dir: std::path::PathBuf,
    /// Throughput sample files are named `<prefix><executor_id>.csv`.
    pub throughput_output_file_prefix: String,
    /// Abort the run if any database operation reports failure.
    pub expect_request_success: bool,
    /// Abort the run if a scan returns fewer records than requested.
    pub expect_scan_amount_found: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            latency_sample_period: 1,
            throughput_sample_period: 0,
            output_dir: std::path::PathBuf::from("."),
            throughput_output_file_prefix: String::from("throughput-"),
            expect_request_success: false,
            expect_scan_amount_found: false,
        }
    }
}

pub mod chooser;
mod cmdline;
pub mod config;
pub mod coordinator;
pub mod error;
mod executor;
pub mod keygen;
pub mod metrics;
pub mod phase;
pub mod pool;
pub mod session;
pub mod stores;
pub mod trace;
mod valuegen;
pub mod workload;
mod zeta;

pub use cmdline::cmdline;
pub use error::Error;
pub use metrics::BenchmarkResult;
pub use session::Session;
pub use workload::PhasedWorkload;

pub extern crate inventory;
pub extern crate toml;
