//! The top-level benchmark façade.
//!
//! A [`Session`] owns the store under test and a fixed pool of worker threads. Workers call
//! [`DatabaseInterface::initialize_worker`] as they come up and
//! [`DatabaseInterface::shutdown_worker`] as the session tears down. In between, the session
//! can bulk-load an initial dataset, replay traces, and run phased workloads, returning one
//! aggregated [`BenchmarkResult`] per run.
//!
//! ```no_run
//! use phasebench::stores::null::NullStore;
//! use phasebench::{PhasedWorkload, RunOptions, Session};
//!
//! let workload = PhasedWorkload::load_from("workload.toml", 42, 0).unwrap();
//! let mut session = Session::new(NullStore::new(), 4).unwrap();
//! session.initialize();
//! session.replay_bulk_load(&workload.load_trace(true).unwrap()).unwrap();
//! let result = session.run_workload(&workload, &RunOptions::default()).unwrap();
//! println!("{}", result);
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use quanta::Instant;

use crate::error::Error;
use crate::executor::Executor;
use crate::metrics::{BenchmarkResult, FrozenMeter, Meter, MetricsTracker};
use crate::pool::{Latch, ThreadPool, WorkerCallback};
use crate::trace::{BulkLoadTrace, Trace, TraceWorkload};
use crate::{DatabaseInterface, RunOptions, Workload};

/// Lifecycle owner for one store under test.
pub struct Session<D: DatabaseInterface> {
    db: Arc<D>,
    pool: Option<ThreadPool>,
    num_threads: usize,
    initialized: bool,
}

impl<D: DatabaseInterface> Session<D> {
    /// Start a session that runs workloads with `num_threads` worker threads.
    pub fn new(db: D, num_threads: usize) -> Result<Self, Error> {
        Self::build(db, num_threads, None)
    }

    /// Like [`Session::new`], but pin each worker to the corresponding core in `core_map`.
    /// The core map must have one entry per thread.
    pub fn with_core_map(db: D, num_threads: usize, core_map: Vec<usize>) -> Result<Self, Error> {
        if core_map.len() != num_threads {
            return Err(Error::config(
                "the core map must have one entry per thread",
            ));
        }
        Self::build(db, num_threads, Some(core_map))
    }

    fn build(db: D, num_threads: usize, core_map: Option<Vec<usize>>) -> Result<Self, Error> {
        if num_threads == 0 {
            return Err(Error::config("must use at least 1 thread"));
        }
        let db = Arc::new(db);
        let on_start: WorkerCallback = {
            let db = db.clone();
            Arc::new(move |worker_id| db.initialize_worker(worker_id))
        };
        let on_shutdown: WorkerCallback = {
            let db = db.clone();
            Arc::new(move |worker_id| db.shutdown_worker(worker_id))
        };
        let pool = match core_map {
            Some(core_map) => {
                ThreadPool::with_core_map(num_threads, core_map, on_start, on_shutdown)
            }
            None => ThreadPool::new(num_threads, on_start, on_shutdown),
        };
        Ok(Self {
            db,
            pool: Some(pool),
            num_threads,
            initialized: false,
        })
    }

    /// The store under test, for calling custom methods.
    pub fn db(&self) -> &D {
        &self.db
    }

    /// Call [`DatabaseInterface::initialize_database`] on a single worker. Must run before
    /// any replay or run method; calling it again is a no-op.
    pub fn initialize(&mut self) {
        let pool = match &self.pool {
            Some(pool) if !self.initialized => pool,
            _ => return,
        };
        let db = self.db.clone();
        pool.submit(move || db.initialize_database()).wait();
        self.initialized = true;
    }

    /// Shut the store down (if it was initialized) and join the worker threads. A
    /// terminated session cannot be restarted; dropping the session terminates it
    /// implicitly.
    pub fn terminate(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        if self.initialized {
            let db = self.db.clone();
            pool.submit(move || db.shutdown_database()).wait();
        }
        // Dropping the pool drains it and joins the workers.
        drop(pool);
    }

    /// Replay a bulk-load trace on a single worker and report it as one write meter.
    pub fn replay_bulk_load(&self, load: &BulkLoadTrace) -> Result<BenchmarkResult, Error> {
        let pool = self.pool.as_ref().ok_or(Error::Terminated)?;
        let db = self.db.clone();
        let load_for_worker = load.clone();
        let (succeeded, run_time) = pool
            .submit(move || {
                let start = Instant::now();
                let succeeded = db.bulk_load(&load_for_worker);
                (succeeded, start.elapsed())
            })
            .wait();
        if !succeeded {
            return Err(Error::RequestFailed { op: "bulk load" });
        }
        let mut load_meter = Meter::new(1);
        load_meter.record_multiple(Some(run_time), load.dataset_size_bytes(), load.len() as u64);
        Ok(BenchmarkResult::from_meters(
            run_time,
            FrozenMeter::default(),
            load_meter.freeze(),
            FrozenMeter::default(),
            FrozenMeter::default(),
        ))
    }

    /// Replay a trace, splitting its requests across the worker threads.
    pub fn replay_trace(&self, trace: Trace, options: &RunOptions) -> Result<BenchmarkResult, Error> {
        self.run_workload(&TraceWorkload::new(trace), options)
    }

    /// Run a workload: one producer per worker thread, all started simultaneously once
    /// every executor has finished preparing.
    ///
    /// The reported wall time spans from just before the start signal to just after the
    /// last executor finishes. On a fatal error the pool is drained first and no partial
    /// metrics are returned.
    pub fn run_workload<W>(&self, workload: &W, options: &RunOptions) -> Result<BenchmarkResult, Error>
    where
        W: Workload,
    {
        let pool = self.pool.as_ref().ok_or(Error::Terminated)?;
        let producers = workload.producers(self.num_threads)?;
        debug!("running workload with {} producers", producers.len());

        let can_start = Arc::new(Latch::new());
        let mut readies = Vec::with_capacity(self.num_threads);
        let mut dones = Vec::with_capacity(self.num_threads);
        let mut handles = Vec::with_capacity(self.num_threads);

        for (id, producer) in producers.into_iter().enumerate() {
            let ready = Arc::new(Latch::new());
            let done = Arc::new(Latch::new());
            let executor = Executor::new(
                self.db.clone(),
                producer,
                id,
                ready.clone(),
                can_start.clone(),
                done.clone(),
                options.clone(),
            );
            handles.push(pool.submit(move || executor.run()));
            readies.push(ready);
            dones.push(done);
        }

        // Wait for the executors to finish their startup work, then start the workload and
        // the timer together.
        for ready in &readies {
            ready.wait();
        }
        let start = Instant::now();
        can_start.raise();
        for done in &dones {
            done.wait();
        }
        let total_run_time: Duration = start.elapsed();

        // Retrieve the per-executor results. All executors have raised `done` by now, so
        // collecting cannot block behind the workload itself.
        let mut trackers = Vec::with_capacity(self.num_threads);
        let mut first_error = None;
        for handle in handles {
            match handle.wait() {
                Ok(tracker) => trackers.push(tracker),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(MetricsTracker::finalize_group(total_run_time, trackers))
    }
}

impl<D: DatabaseInterface> Drop for Session<D> {
    fn drop(&mut self) {
        self.terminate();
    }
}

// {{{ tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::btreemap::MutexBTreeMap;
    use crate::stores::null::NullStore;
    use crate::{Operation, PhasedWorkload, Request};
    use std::sync::atomic::{AtomicU64, Ordering};

    const SMALL_WORKLOAD: &str = r#"
        record_size_bytes = 16

        [load]
        num_records = 1000
        distribution = { type = "uniform", range_min = 0, range_max = 999 }

        [[run]]
        num_requests = 10000
        read = { proportion_pct = 100, distribution = { type = "uniform" } }
    "#;

    fn uniform_session() -> (Session<MutexBTreeMap>, PhasedWorkload) {
        let workload = PhasedWorkload::from_toml_str(SMALL_WORKLOAD, 42, 0).unwrap();
        let mut session = Session::new(MutexBTreeMap::new(), 2).unwrap();
        session.initialize();
        session
            .replay_bulk_load(&workload.load_trace(true).unwrap())
            .unwrap();
        (session, workload)
    }

    #[test]
    fn uniform_read_workload_end_to_end() {
        let (session, workload) = uniform_session();
        let options = RunOptions {
            expect_request_success: true,
            ..RunOptions::default()
        };
        let result = session.run_workload(&workload, &options).unwrap();
        assert_eq!(result.reads().num_requests(), 10000);
        assert_eq!(result.writes().num_requests(), 0);
        assert_eq!(result.num_failed_reads(), 0);
        // Every request was timed with the default sample period of 1.
        assert!(result.reads().latency_percentile(0.99) > Duration::ZERO);
        assert!(result.run_time() > Duration::ZERO);
    }

    #[test]
    fn bulk_load_reports_one_write_meter() {
        let workload = PhasedWorkload::from_toml_str(SMALL_WORKLOAD, 42, 0).unwrap();
        let mut session = Session::new(MutexBTreeMap::new(), 2).unwrap();
        session.initialize();
        let result = session
            .replay_bulk_load(&workload.load_trace(true).unwrap())
            .unwrap();
        assert_eq!(result.writes().num_requests(), 1);
        assert_eq!(result.writes().num_records(), 1000);
        assert_eq!(result.writes().total_bytes(), 1000 * 16);
        assert_eq!(session.db().len(), 1000);
    }

    #[test]
    fn mixed_workload_against_btreemap() {
        let text = r#"
            record_size_bytes = 16

            [load]
            num_records = 1000
            distribution = { type = "uniform", range_min = 0, range_max = 9999 }

            [[run]]
            num_requests = 2000
            read = { proportion_pct = 40, distribution = { type = "zipfian", theta = 0.9 } }
            update = { proportion_pct = 20, distribution = { type = "uniform" } }
            scan = { proportion_pct = 20, max_length = 10, distribution = { type = "uniform" } }
            insert = { proportion_pct = 20, distribution = { type = "uniform", range_min = 10000, range_max = 19999 } }
        "#;
        let workload = PhasedWorkload::from_toml_str(text, 7, 0).unwrap();
        let mut session = Session::new(MutexBTreeMap::new(), 4).unwrap();
        session.initialize();
        session
            .replay_bulk_load(&workload.load_trace(true).unwrap())
            .unwrap();
        let options = RunOptions {
            expect_request_success: true,
            ..RunOptions::default()
        };
        let result = session.run_workload(&workload, &options).unwrap();
        let total = result.reads().num_requests()
            + result.writes().num_requests()
            + result.scans().num_requests();
        // Read-modify-writes would double-count; there are none here. Inserts and updates
        // both land in the write meter.
        assert_eq!(total, 2000);
        // 4 producers x 100 inserts each.
        let store_size = session.db().len();
        assert_eq!(store_size, 1000 + 400);
        assert!(result.scans().num_records() > 0);
    }

    #[test]
    fn delete_workload_empties_the_store() {
        let text = r#"
            record_size_bytes = 16

            [load]
            num_records = 100
            distribution = { type = "uniform", range_min = 0, range_max = 999 }

            [[run]]
            num_requests = 100
            delete = { proportion_pct = 100, distribution = { type = "uniform" } }
        "#;
        let workload = PhasedWorkload::from_toml_str(text, 3, 0).unwrap();
        let mut session = Session::new(MutexBTreeMap::new(), 2).unwrap();
        session.initialize();
        session
            .replay_bulk_load(&workload.load_trace(true).unwrap())
            .unwrap();
        let options = RunOptions {
            expect_request_success: true,
            ..RunOptions::default()
        };
        let result = session.run_workload(&workload, &options).unwrap();
        assert_eq!(result.deletes().num_requests(), 100);
        assert_eq!(result.num_failed_deletes(), 0);
        assert_eq!(session.db().len(), 0);
    }

    #[test]
    fn negative_reads_miss_and_are_counted() {
        let text = r#"
            record_size_bytes = 16

            [load]
            num_records = 100
            distribution = { type = "uniform", range_min = 0, range_max = 999 }

            [[run]]
            num_requests = 500
            negativeread = { proportion_pct = 100, distribution = { type = "uniform" } }
        "#;
        let workload = PhasedWorkload::from_toml_str(text, 3, 0).unwrap();
        let mut session = Session::new(MutexBTreeMap::new(), 1).unwrap();
        session.initialize();
        session
            .replay_bulk_load(&workload.load_trace(true).unwrap())
            .unwrap();
        let result = session
            .run_workload(&workload, &RunOptions::default())
            .unwrap();
        // Negative reads are reads that miss: they land in the failed-read counter.
        assert_eq!(result.num_failed_reads(), 500);
        assert_eq!(result.reads().num_requests(), 0);
    }

    #[test]
    fn expectation_failures_abort_the_run() {
        let (session, workload) = uniform_session();
        // Wipe the store behind the workload's back so every read misses.
        session.db().clear();
        let options = RunOptions {
            expect_request_success: true,
            ..RunOptions::default()
        };
        match session.run_workload(&workload, &options) {
            Err(Error::RequestFailed { op }) => assert_eq!(op, "read"),
            other => panic!("expected a request failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_records_are_counted_without_expectations() {
        let (session, workload) = uniform_session();
        session.db().clear();
        let result = session
            .run_workload(&workload, &RunOptions::default())
            .unwrap();
        assert_eq!(result.num_failed_reads(), 10000);
        assert_eq!(result.reads().num_requests(), 0);
    }

    #[test]
    fn throughput_samples_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let (session, workload) = uniform_session();
        let options = RunOptions {
            throughput_sample_period: 100,
            output_dir: dir.path().to_path_buf(),
            throughput_output_file_prefix: "tput-".to_string(),
            ..RunOptions::default()
        };
        session.run_workload(&workload, &options).unwrap();
        for id in 0..2 {
            let content =
                std::fs::read_to_string(dir.path().join(format!("tput-{}.csv", id))).unwrap();
            let mut lines = content.lines();
            assert_eq!(lines.next().unwrap(), "mrecords_per_s,elapsed_ns");
            // 5000 requests per executor at one sample per 100 requests.
            assert_eq!(lines.count(), 50);
        }
    }

    #[test]
    fn trace_replay_round_trips() {
        let requests: Vec<Request> = (0..100)
            .map(|i| {
                let mut req = Request::new(Operation::Insert, i);
                req.value = Some(vec![0u8; 8].into());
                req
            })
            .collect();
        let mut session = Session::new(MutexBTreeMap::new(), 4).unwrap();
        session.initialize();
        let options = RunOptions {
            expect_request_success: true,
            ..RunOptions::default()
        };
        let result = session
            .replay_trace(Trace::from_requests(requests), &options)
            .unwrap();
        assert_eq!(result.writes().num_requests(), 100);
        assert_eq!(session.db().len(), 100);
    }

    #[test]
    fn session_lifecycle_hooks() {
        struct HookCounting {
            inner: NullStore,
            worker_inits: AtomicU64,
            db_inits: AtomicU64,
            shutdowns: AtomicU64,
        }
        impl DatabaseInterface for HookCounting {
            fn initialize_worker(&self, _worker_id: usize) {
                self.worker_inits.fetch_add(1, Ordering::Relaxed);
            }
            fn initialize_database(&self) {
                self.db_inits.fetch_add(1, Ordering::Relaxed);
            }
            fn shutdown_database(&self) {
                self.shutdowns.fetch_add(1, Ordering::Relaxed);
            }
            fn read(&self, key: u64, value_out: &mut Vec<u8>) -> bool {
                self.inner.read(key, value_out)
            }
            fn insert(&self, key: u64, value: &[u8]) -> bool {
                self.inner.insert(key, value)
            }
            fn update(&self, key: u64, value: &[u8]) -> bool {
                self.inner.update(key, value)
            }
            fn delete(&self, key: u64) -> bool {
                self.inner.delete(key)
            }
            fn scan(&self, key: u64, amount: u64, out: &mut Vec<(u64, Vec<u8>)>) -> bool {
                self.inner.scan(key, amount, out)
            }
        }

        let store = HookCounting {
            inner: NullStore::new(),
            worker_inits: AtomicU64::new(0),
            db_inits: AtomicU64::new(0),
            shutdowns: AtomicU64::new(0),
        };
        let mut session = Session::new(store, 3).unwrap();
        session.initialize();
        session.initialize(); // idempotent
        assert_eq!(session.db().db_inits.load(Ordering::Relaxed), 1);
        let db = session.db.clone();
        session.terminate();
        assert_eq!(db.worker_inits.load(Ordering::Relaxed), 3);
        assert_eq!(db.shutdowns.load(Ordering::Relaxed), 1);
        // Work after termination is refused.
        let workload = PhasedWorkload::from_toml_str(SMALL_WORKLOAD, 1, 0).unwrap();
        assert!(matches!(
            session.run_workload(&workload, &RunOptions::default()),
            Err(Error::Terminated)
        ));
    }

    #[test]
    fn zero_threads_rejected() {
        assert!(Session::new(NullStore::new(), 0).is_err());
        assert!(Session::with_core_map(NullStore::new(), 2, vec![0]).is_err());
    }
}

// }}} tests
