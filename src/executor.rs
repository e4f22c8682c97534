//! Drives one producer's request stream against the store under test.
//!
//! One executor runs per producer, on its own pool worker. The lifecycle is: prepare the
//! producer (expensive work like insert-key generation happens here, off the benchmark
//! clock), raise the `ready` latch, block on the shared `can_start` latch, drain the
//! producer against the database while recording metrics, and finally raise `done`.
//!
//! Latency is sampled by bracketing every `latency_sample_period`-th database call with a
//! monotonic clock. Throughput is sampled by appending a CSV row every
//! `throughput_sample_period` requests to `<output_dir>/<prefix><id>.csv`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use quanta::Instant;

use crate::error::Error;
use crate::metrics::MetricsTracker;
use crate::pool::Latch;
use crate::{DatabaseInterface, Key, Operation, RunOptions, WorkloadProducer};

pub(crate) struct Executor<D: DatabaseInterface, P: WorkloadProducer> {
    db: Arc<D>,
    producer: P,
    id: usize,
    options: RunOptions,

    ready: Arc<Latch>,
    can_start: Arc<Latch>,
    done: Arc<Latch>,

    tracker: MetricsTracker,
    latency_sampling_counter: u64,
    throughput_sampling_counter: u64,
}

/// Brackets `f` with a monotonic clock when `measure` is set.
fn measured(measure: bool, f: impl FnOnce()) -> Option<Duration> {
    if !measure {
        f();
        return None;
    }
    let start = Instant::now();
    f();
    Some(start.elapsed())
}

/// Fold up to the first four bytes of a read value into the dead-read defeater.
fn value_prefix(value: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    let n = value.len().min(4);
    bytes[..n].copy_from_slice(&value[..n]);
    u32::from_le_bytes(bytes)
}

impl<D: DatabaseInterface, P: WorkloadProducer> Executor<D, P> {
    pub(crate) fn new(
        db: Arc<D>,
        producer: P,
        id: usize,
        ready: Arc<Latch>,
        can_start: Arc<Latch>,
        done: Arc<Latch>,
        options: RunOptions,
    ) -> Self {
        Self {
            db,
            producer,
            id,
            options,
            ready,
            can_start,
            done,
            tracker: MetricsTracker::new(),
            latency_sampling_counter: 0,
            throughput_sampling_counter: 0,
        }
    }

    /// Run the executor to completion and hand back its metrics.
    ///
    /// The latch protocol is upheld on every path, including failed preparation, so the
    /// session never deadlocks waiting for `ready` or `done`.
    pub(crate) fn run(mut self) -> Result<MetricsTracker, Error> {
        let prepared = self
            .producer
            .prepare()
            .and_then(|_| self.open_throughput_output_file());

        self.ready.raise();
        self.can_start.wait();

        let outcome = match prepared {
            Ok(output_file) => self.workload_loop(output_file),
            Err(e) => Err(e),
        };

        self.done.raise();
        outcome.map(|_| self.tracker)
    }

    fn open_throughput_output_file(&self) -> Result<Option<BufWriter<File>>, Error> {
        if self.options.throughput_sample_period == 0 {
            return Ok(None);
        }
        let filename = self.options.output_dir.join(format!(
            "{}{}.csv",
            self.options.throughput_output_file_prefix, self.id
        ));
        let mut file = BufWriter::new(File::create(filename)?);
        writeln!(file, "mrecords_per_s,elapsed_ns")?;
        Ok(Some(file))
    }

    fn workload_loop(&mut self, mut output_file: Option<BufWriter<File>>) -> Result<(), Error> {
        debug!("executor {} entering workload loop", self.id);
        let mut read_xor = 0u32;
        let mut value_out: Vec<u8> = Vec::new();
        let mut scan_out: Vec<(Key, Vec<u8>)> = Vec::new();

        self.tracker.reset_sample();

        while self.producer.has_next() {
            let req = self.producer.next();

            self.latency_sampling_counter += 1;
            let measure = self.latency_sampling_counter >= self.options.latency_sample_period;
            if measure {
                self.latency_sampling_counter = 0;
            }

            match req.op {
                Operation::Read | Operation::NegativeRead => {
                    let mut succeeded = false;
                    value_out.clear();
                    let run_time = measured(measure, || {
                        succeeded = self.db.read(req.key, &mut value_out);
                        if succeeded {
                            // Force a read of the extracted value so the fetch is counted
                            // against the read latency.
                            read_xor ^= value_prefix(&value_out);
                        }
                    });
                    self.tracker
                        .record_read(run_time, value_out.len() as u64, succeeded);
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "read" });
                    }
                }

                Operation::Insert => {
                    // Inserts count the whole record, since this is the first time the full
                    // record is written to the store.
                    let value = req.value.as_deref().unwrap_or(&[]);
                    let mut succeeded = false;
                    let run_time = measured(measure, || {
                        succeeded = self.db.insert(req.key, value);
                    });
                    self.tracker.record_write(
                        run_time,
                        (value.len() + std::mem::size_of::<Key>()) as u64,
                        succeeded,
                    );
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "insert" });
                    }
                }

                Operation::Update => {
                    // Updates only count the value, since the key already exists.
                    let value = req.value.as_deref().unwrap_or(&[]);
                    let mut succeeded = false;
                    let run_time = measured(measure, || {
                        succeeded = self.db.update(req.key, value);
                    });
                    self.tracker
                        .record_write(run_time, value.len() as u64, succeeded);
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "update" });
                    }
                }

                Operation::Scan => {
                    let mut succeeded = false;
                    scan_out.clear();
                    scan_out.reserve(req.scan_amount as usize);
                    let run_time = measured(measure, || {
                        succeeded = self.db.scan(req.key, req.scan_amount, &mut scan_out);
                        if succeeded {
                            if let Some((_, value)) = scan_out.first() {
                                read_xor ^= value_prefix(value);
                            }
                        }
                    });
                    let scanned_bytes: u64 = scan_out
                        .iter()
                        .map(|(_, value)| (std::mem::size_of::<Key>() + value.len()) as u64)
                        .sum();
                    self.tracker.record_scan(
                        run_time,
                        scanned_bytes,
                        scan_out.len() as u64,
                        succeeded,
                    );
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "scan" });
                    }
                    if self.options.expect_scan_amount_found
                        && (scan_out.len() as u64) < req.scan_amount
                    {
                        return Err(Error::ScanShortfall {
                            requested: req.scan_amount,
                            returned: scan_out.len(),
                        });
                    }
                }

                Operation::ReadModifyWrite => {
                    // The read and the write are measured and recorded separately.
                    let mut succeeded = false;
                    value_out.clear();
                    let read_run_time = measured(measure, || {
                        succeeded = self.db.read(req.key, &mut value_out);
                        if succeeded {
                            read_xor ^= value_prefix(&value_out);
                        }
                    });
                    self.tracker
                        .record_read(read_run_time, value_out.len() as u64, succeeded);
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "read-modify-write" });
                    }
                    // The write is skipped if the read failed.
                    if succeeded {
                        let value = req.value.as_deref().unwrap_or(&[]);
                        let write_run_time = measured(measure, || {
                            succeeded = self.db.update(req.key, value);
                        });
                        self.tracker
                            .record_write(write_run_time, value.len() as u64, succeeded);
                        if !succeeded && self.options.expect_request_success {
                            return Err(Error::RequestFailed { op: "read-modify-write" });
                        }
                    }
                }

                Operation::Delete => {
                    let mut succeeded = false;
                    let run_time = measured(measure, || {
                        succeeded = self.db.delete(req.key);
                    });
                    self.tracker.record_delete(run_time, succeeded);
                    if !succeeded && self.options.expect_request_success {
                        return Err(Error::RequestFailed { op: "delete" });
                    }
                }
            }

            if self.options.throughput_sample_period > 0 {
                self.throughput_sampling_counter += 1;
                if self.throughput_sampling_counter >= self.options.throughput_sample_period {
                    self.throughput_sampling_counter = 0;
                    let sample = self.tracker.sample();
                    if let Some(file) = output_file.as_mut() {
                        writeln!(
                            file,
                            "{},{}",
                            sample.mrecords_per_second(),
                            sample.elapsed().as_nanos()
                        )?;
                    }
                }
            }
        }

        if let Some(mut file) = output_file {
            file.flush()?;
        }
        self.tracker.set_read_xor(read_xor);
        debug!("executor {} finished", self.id);
        Ok(())
    }
}
