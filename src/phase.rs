//! Per-worker descriptor of one workload stage.
//!
//! A [`Phase`] is owned by a single producer. It carries the request and insert budgets, the
//! cumulative operation-mix thresholds, and one chooser per enabled operation. The thresholds
//! are compared against a `U[0, 100)` draw in a fixed cumulative order (see
//! [`config`](crate::config) for how they are derived from the configured proportions).

use crate::chooser::{Chooser, UniformChooser};
use crate::Operation;

/// Identifies a phase within a workload. At most 254 phases are supported; the tag value
/// `phase_id + 1` must stay below 255 because 0xFF in the phase byte is reserved for marking
/// negative-read keys.
pub type PhaseId = u8;

/// Identifies a producer within a run. Producer counts of 255 or more are rejected so that
/// the tag value `producer_id + 1` fits its byte.
pub type ProducerId = u8;

/// A bounded stage of a workload with its own operation mix and distributions.
///
/// Mutated only by its owning producer, except that chooser item counts are adjusted under
/// the shared coordination lock at phase boundaries and on cross-producer deletions.
#[derive(Clone, Debug)]
pub struct Phase {
    pub id: PhaseId,
    pub num_requests: u64,
    pub num_requests_left: u64,
    pub num_inserts: u64,
    pub num_inserts_left: u64,
    pub max_scan_length: u64,

    // Cumulative thresholds against a U[0, 100) draw, in selection order: read, then
    // read-modify-write, negative read, scan, update, delete, with insert as the residual.
    pub(crate) read_thres: u32,
    pub(crate) rmw_thres: u32,
    pub(crate) negativeread_thres: u32,
    pub(crate) scan_thres: u32,
    pub(crate) update_thres: u32,
    pub(crate) delete_thres: u32,

    pub(crate) read_chooser: Option<Chooser>,
    pub(crate) rmw_chooser: Option<Chooser>,
    pub(crate) negativeread_chooser: Option<Chooser>,
    pub(crate) scan_chooser: Option<Chooser>,
    pub(crate) update_chooser: Option<Chooser>,
    pub(crate) delete_chooser: Option<Chooser>,
    pub(crate) scan_length_chooser: Option<UniformChooser>,
}

impl Phase {
    pub(crate) fn new(id: PhaseId) -> Self {
        Self {
            id,
            num_requests: 0,
            num_requests_left: 0,
            num_inserts: 0,
            num_inserts_left: 0,
            max_scan_length: 0,
            read_thres: 0,
            rmw_thres: 0,
            negativeread_thres: 0,
            scan_thres: 0,
            update_thres: 0,
            delete_thres: 0,
            read_chooser: None,
            rmw_chooser: None,
            negativeread_chooser: None,
            scan_chooser: None,
            update_chooser: None,
            delete_chooser: None,
            scan_length_chooser: None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.num_requests_left > 0
    }

    /// The chooser backing key selection for `op`. Panics if the operation is not enabled in
    /// this phase; the producer only dispatches on operations whose thresholds were
    /// configured.
    pub(crate) fn chooser_mut(&mut self, op: Operation) -> &mut Chooser {
        let chooser = match op {
            Operation::Read => &mut self.read_chooser,
            Operation::ReadModifyWrite => &mut self.rmw_chooser,
            Operation::NegativeRead => &mut self.negativeread_chooser,
            Operation::Scan => &mut self.scan_chooser,
            Operation::Update => &mut self.update_chooser,
            Operation::Delete => &mut self.delete_chooser,
            Operation::Insert => unreachable!("inserts do not choose existing keys"),
        };
        chooser
            .as_mut()
            .unwrap_or_else(|| unreachable!("operation drawn without a configured chooser"))
    }

    /// Whether any access operation (anything but insert) is enabled in this phase.
    pub(crate) fn has_choosers(&self) -> bool {
        self.read_chooser.is_some()
            || self.rmw_chooser.is_some()
            || self.negativeread_chooser.is_some()
            || self.scan_chooser.is_some()
            || self.update_chooser.is_some()
            || self.delete_chooser.is_some()
    }

    fn choosers_mut(&mut self) -> impl Iterator<Item = &mut Chooser> {
        [
            self.read_chooser.as_mut(),
            self.rmw_chooser.as_mut(),
            self.negativeread_chooser.as_mut(),
            self.scan_chooser.as_mut(),
            self.update_chooser.as_mut(),
            self.delete_chooser.as_mut(),
        ]
        .into_iter()
        .flatten()
    }

    /// Rebuild every operation chooser for `item_count` visible keys. The scan length
    /// chooser is untouched; it draws lengths, not keys.
    pub(crate) fn set_item_count(&mut self, item_count: usize) {
        for chooser in self.choosers_mut() {
            chooser.set_item_count(item_count);
        }
    }

    /// Grow every operation chooser by `delta` keys.
    pub(crate) fn grow_item_count(&mut self, delta: usize) {
        for chooser in self.choosers_mut() {
            chooser.grow_by(delta);
        }
    }

    /// Shrink every operation chooser by `delta` keys.
    pub(crate) fn shrink_item_count(&mut self, delta: usize) {
        for chooser in self.choosers_mut() {
            chooser.shrink_by(delta);
        }
    }
}
