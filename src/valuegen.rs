//! Cyclic pool of random write payloads.

use std::sync::Arc;

use rand::RngCore;

/// Pre-generates a fixed pool of random byte buffers and hands them out cyclically.
///
/// Values are deliberately not per-request distinct; consumers treat the payload as opaque
/// bytes, and reusing buffers keeps value generation off the benchmark's hot path.
#[derive(Clone, Debug)]
pub(crate) struct ValueGenerator {
    values: Vec<Arc<[u8]>>,
    value_size: usize,
    next: usize,
}

impl ValueGenerator {
    pub(crate) fn new(value_size: usize, num_values: usize, rng: &mut impl RngCore) -> Self {
        assert!(value_size > 0, "value size must be positive");
        let mut values = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            values.push(random_bytes(value_size, rng));
        }
        Self {
            values,
            value_size,
            next: 0,
        }
    }

    pub(crate) fn next_value(&mut self) -> Arc<[u8]> {
        let value = self.values[self.next].clone();
        self.next = (self.next + 1) % self.values.len();
        value
    }

    pub(crate) fn value_size(&self) -> usize {
        self.value_size
    }
}

fn random_bytes(size: usize, rng: &mut impl RngCore) -> Arc<[u8]> {
    let mut buf = vec![0u8; size];
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk.copy_from_slice(&rng.next_u32().to_le_bytes());
    }
    let rest = chunks.into_remainder();
    if !rest.is_empty() {
        let n = rest.len();
        rest.copy_from_slice(&rng.next_u32().to_le_bytes()[..n]);
    }
    buf.into()
}
