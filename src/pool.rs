//! Worker thread pool and one-shot synchronization latches.
//!
//! The pool is fixed-size with a FIFO task queue. Workers optionally pin themselves to cores
//! from a user-provided core map, and run `on_start` / `on_shutdown` callbacks at entry and
//! exit, which the session uses to initialize and tear down per-worker database state.
//! Dropping the pool drains the queue and joins every worker.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::debug;
use parking_lot::{Condvar, Mutex};

/// A one-shot flag that can be raised exactly once and waited on by any number of threads.
///
/// Threads that wait after the raise proceed without blocking.
#[derive(Debug, Default)]
pub struct Latch {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.cond.wait(&mut raised);
        }
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared callback run by each worker with its worker index.
pub type WorkerCallback = Arc<dyn Fn(usize) + Send + Sync>;

struct PoolState {
    queue: VecDeque<Task>,
    shutdown: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    cond: Condvar,
}

/// A fixed-size pool of worker threads with optional per-thread core pinning.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool with `num_threads` workers. `on_start` runs on each worker as it comes
    /// up, `on_shutdown` as it exits.
    pub fn new(num_threads: usize, on_start: WorkerCallback, on_shutdown: WorkerCallback) -> Self {
        Self::build(num_threads, None, on_start, on_shutdown)
    }

    /// Like [`ThreadPool::new`], but pin worker `i` to core `core_map[i % core_map.len()]`.
    pub fn with_core_map(
        num_threads: usize,
        core_map: Vec<usize>,
        on_start: WorkerCallback,
        on_shutdown: WorkerCallback,
    ) -> Self {
        Self::build(num_threads, Some(core_map), on_start, on_shutdown)
    }

    fn build(
        num_threads: usize,
        core_map: Option<Vec<usize>>,
        on_start: WorkerCallback,
        on_shutdown: WorkerCallback,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            cond: Condvar::new(),
        });
        let mut workers = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let shared = shared.clone();
            let on_start = on_start.clone();
            let on_shutdown = on_shutdown.clone();
            let core = core_map.as_ref().map(|map| map[worker_id % map.len()]);
            workers.push(std::thread::spawn(move || {
                if let Some(core) = core {
                    pin_to_core(core);
                }
                worker_main(worker_id, &shared, &on_start, &on_shutdown);
            }));
        }
        Self { shared, workers }
    }

    /// Schedule `f` to run on a pool worker, fire-and-forget.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.state.lock();
        state.queue.push_back(Box::new(f));
        drop(state);
        self.shared.cond.notify_one();
    }

    /// Schedule `f` to run on a pool worker and return a handle to wait for its result.
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.execute(move || {
            // The receiver may have been dropped; the result is then discarded.
            let _ = tx.send(f());
        });
        TaskHandle { rx }
    }
}

impl Drop for ThreadPool {
    /// Waits for all submitted tasks to execute, then joins the workers.
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.cond.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Waits for the result of a task submitted with [`ThreadPool::submit`].
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run and return its result.
    ///
    /// Panics if the worker running the task panicked.
    pub fn wait(self) -> T {
        self.rx
            .recv()
            .expect("a pool worker terminated before completing its task")
    }
}

fn worker_main(
    worker_id: usize,
    shared: &PoolShared,
    on_start: &WorkerCallback,
    on_shutdown: &WorkerCallback,
) {
    debug!("pool worker {} starting", worker_id);
    on_start(worker_id);
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                shared.cond.wait(&mut state);
            }
        };
        match task {
            Some(task) => task(),
            None => break,
        }
    }
    on_shutdown(worker_id);
    debug!("pool worker {} shutting down", worker_id);
}

fn pin_to_core(core: usize) {
    if let Some(cores) = core_affinity::get_core_ids() {
        core_affinity::set_for_current(cores[core % cores.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> WorkerCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn submit_returns_results() {
        let pool = ThreadPool::new(2, noop(), noop());
        let handle = pool.submit(|| 21 * 2);
        assert_eq!(handle.wait(), 42);
    }

    #[test]
    fn drop_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(2, noop(), noop());
            for _ in 0..100 {
                let counter = counter.clone();
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn worker_callbacks_run_once_per_worker() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let starts = starts.clone();
            let stops = stops.clone();
            let _pool = ThreadPool::new(
                4,
                Arc::new(move |_| {
                    starts.fetch_add(1, Ordering::Relaxed);
                }),
                Arc::new(move |_| {
                    stops.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }
        assert_eq!(starts.load(Ordering::Relaxed), 4);
        assert_eq!(stops.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn latch_releases_all_waiters() {
        let latch = Arc::new(Latch::new());
        let released = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let latch = latch.clone();
            let released = released.clone();
            handles.push(std::thread::spawn(move || {
                latch.wait();
                released.fetch_add(1, Ordering::Relaxed);
            }));
        }
        assert_eq!(released.load(Ordering::Relaxed), 0);
        latch.raise();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(released.load(Ordering::Relaxed), 4);
        // Waiting after the raise does not block.
        latch.wait();
    }

    #[test]
    fn tasks_run_concurrently_across_workers() {
        // Two tasks that each need the other to make progress only finish if they run on
        // distinct workers.
        let pool = ThreadPool::new(2, noop(), noop());
        let a = Arc::new(Latch::new());
        let b = Arc::new(Latch::new());
        let (a2, b2) = (a.clone(), b.clone());
        let first = pool.submit(move || {
            a2.raise();
            b2.wait();
        });
        let second = pool.submit(move || {
            a.wait();
            b.raise();
        });
        first.wait();
        second.wait();
    }
}
