//! In-memory request traces.
//!
//! A [`Trace`] is a flat list of requests that can be replayed against a store, either to
//! bulk-load an initial dataset ([`BulkLoadTrace`]) or as a benchmark of its own through
//! [`TraceWorkload`], which splits the trace into contiguous per-worker slices. Traces live
//! for a single run; persisting or replaying captured request streams across runs is out of
//! scope.

use std::sync::Arc;

use rand::RngCore;

use crate::error::Error;
use crate::valuegen::ValueGenerator;
use crate::{Key, Operation, Request, Workload, WorkloadProducer};

/// An immutable, cheaply cloneable list of requests.
#[derive(Clone, Debug)]
pub struct Trace {
    requests: Arc<Vec<Request>>,
}

impl Trace {
    pub fn from_requests(requests: Vec<Request>) -> Self {
        Self {
            requests: Arc::new(requests),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// The smallest and largest key in the trace, if any.
    pub fn key_range(&self) -> Option<(Key, Key)> {
        let min = self.requests.iter().map(|r| r.key).min()?;
        let max = self.requests.iter().map(|r| r.key).max()?;
        Some((min, max))
    }
}

/// A trace of inserts covering an initial dataset, replayed single-threaded before a run.
#[derive(Clone, Debug)]
pub struct BulkLoadTrace {
    trace: Trace,
    value_size: usize,
}

impl BulkLoadTrace {
    /// Build one insert request per key, with `value_size`-byte payloads drawn from a cyclic
    /// random pool. With `sort_requests`, records appear in ascending key order.
    pub fn from_keys(
        keys: &[Key],
        value_size: usize,
        sort_requests: bool,
        rng: &mut impl RngCore,
    ) -> Self {
        let mut keys = keys.to_vec();
        if sort_requests {
            keys.sort_unstable();
        }
        let mut valuegen = ValueGenerator::new(value_size, 100, rng);
        let requests = keys
            .into_iter()
            .map(|key| Request {
                op: Operation::Insert,
                key,
                scan_amount: 0,
                value: Some(valuegen.next_value()),
            })
            .collect();
        Self {
            trace: Trace::from_requests(requests),
            value_size,
        }
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.trace.iter()
    }

    /// Total payload the load represents: one key plus one value per record.
    pub fn dataset_size_bytes(&self) -> u64 {
        self.trace.len() as u64 * (std::mem::size_of::<Key>() + self.value_size) as u64
    }
}

/// Wraps a [`Trace`] as a trivial workload: requests are split among the producers in
/// contiguous slices and replayed in order.
#[derive(Clone, Debug)]
pub struct TraceWorkload {
    trace: Trace,
}

impl TraceWorkload {
    pub fn new(trace: Trace) -> Self {
        Self { trace }
    }
}

impl Workload for TraceWorkload {
    type Producer = TraceProducer;

    fn producers(&self, num_producers: usize) -> Result<Vec<TraceProducer>, Error> {
        if num_producers == 0 {
            return Err(Error::config("must use at least 1 producer"));
        }
        let total = self.trace.len();
        let base = total / num_producers;
        let remainder = total % num_producers;
        let mut producers = Vec::with_capacity(num_producers);
        let mut start = 0;
        for id in 0..num_producers {
            let len = base + usize::from(id < remainder);
            producers.push(TraceProducer {
                requests: self.trace.requests.clone(),
                position: start,
                end: start + len,
            });
            start += len;
        }
        Ok(producers)
    }
}

/// Replays one contiguous slice of a trace.
pub struct TraceProducer {
    requests: Arc<Vec<Request>>,
    position: usize,
    end: usize,
}

impl WorkloadProducer for TraceProducer {
    fn prepare(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.position < self.end
    }

    fn next(&mut self) -> Request {
        assert!(self.has_next(), "the trace slice is exhausted");
        let request = self.requests[self.position].clone();
        self.position += 1;
        request
    }
}
