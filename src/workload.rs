//! The phased workload and its per-worker producers.
//!
//! A [`PhasedWorkload`] is created from a [`WorkloadConfig`] plus a PRNG seed. It generates
//! (or accepts) the initial load dataset and splits itself into one [`Producer`] per worker
//! thread. Each producer walks the configured phases in order and emits a deterministic
//! request stream: rerunning the same workload with the same seed reproduces every producer's
//! stream byte for byte, because producer `i` draws from its own PRNG seeded with
//! `master_seed ^ i`.
//!
//! Producers share one [`WorkloadCoordinator`] so that load-key deletions made by any worker
//! are observed by all of them; everything else (insert lists, insert deletions, value pools)
//! is producer-local.

use std::sync::Arc;

use hashbrown::HashMap;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::{WorkloadConfig, MAX_NUM_PRODUCERS};
use crate::coordinator::{logical_to_physical, DeletionMap, WorkloadCoordinator};
use crate::error::Error;
use crate::phase::{Phase, PhaseId, ProducerId};
use crate::trace::BulkLoadTrace;
use crate::valuegen::ValueGenerator;
use crate::{Key, Operation, Request, Workload, WorkloadProducer, MAX_KEY};

/// Producers cycle through this many unique values when inserting or updating.
const NUM_UNIQUE_VALUES: usize = 100;

/// Tag `keys` in place with their origin: `(key << 16) | (phase_tag << 8) | producer_tag`.
/// The initial load uses `(0, 0)`; phase inserts use `(phase_id + 1, producer_id + 1)`.
fn apply_phase_and_producer_ids(keys: &mut [Key], phase_tag: u8, producer_tag: u8) {
    for key in keys.iter_mut() {
        *key = (*key << 16) | ((phase_tag as u64) << 8) | producer_tag as u64;
    }
}

// {{{ phasedworkload

/// A customizable workload with phases, ready to be split into producers.
#[derive(Clone, Debug)]
pub struct PhasedWorkload {
    config: Arc<WorkloadConfig>,
    master_seed: u64,
    /// Tagged and sorted; empty until `set_custom_load_dataset` when the load section uses a
    /// custom dataset.
    load_keys: Vec<Key>,
    custom_inserts: Arc<HashMap<String, Vec<Key>>>,
}

impl PhasedWorkload {
    /// Create a workload from the configuration in the provided file. Set `prng_seed` to
    /// ensure reproducibility. Setting `set_record_size_bytes` to a positive value overrides
    /// the record size specified in the workload file, if any.
    pub fn load_from(
        config_file: impl AsRef<std::path::Path>,
        prng_seed: u64,
        set_record_size_bytes: usize,
    ) -> Result<Self, Error> {
        Self::new(
            WorkloadConfig::load_from(config_file, set_record_size_bytes)?,
            prng_seed,
        )
    }

    /// Create a workload from a configuration stored in a TOML string.
    pub fn from_toml_str(
        text: &str,
        prng_seed: u64,
        set_record_size_bytes: usize,
    ) -> Result<Self, Error> {
        Self::new(
            WorkloadConfig::from_toml_str(text, set_record_size_bytes)?,
            prng_seed,
        )
    }

    pub fn new(config: WorkloadConfig, prng_seed: u64) -> Result<Self, Error> {
        let mut load_keys = Vec::new();
        if !config.using_custom_dataset() {
            let num_records = config.num_load_records() as usize;
            let generator = config.load_generator()?;
            let mut prng = Xoshiro256PlusPlus::seed_from_u64(prng_seed);
            load_keys.resize(num_records, 0);
            generator.generate_into(&mut prng, &mut load_keys);
            apply_phase_and_producer_ids(&mut load_keys, 0, 0);
            // Keep the initial load keys sorted to allow for efficiently generating
            // clustered hot sets.
            load_keys.sort_unstable();
        }
        Ok(Self {
            config: Arc::new(config),
            master_seed: prng_seed,
            load_keys,
            custom_inserts: Arc::new(HashMap::new()),
        })
    }

    /// Supply the initial dataset directly. The workload's load section must declare the
    /// `custom` distribution.
    pub fn set_custom_load_dataset(&mut self, mut dataset: Vec<Key>) -> Result<(), Error> {
        if !self.config.using_custom_dataset() {
            return Err(Error::config(
                "the load distribution must be custom to supply a dataset",
            ));
        }
        if dataset.is_empty() {
            return Err(Error::config("the custom dataset must not be empty"));
        }
        if dataset.iter().any(|key| *key > MAX_KEY) {
            return Err(Error::config("the maximum supported key is 2^48 - 1"));
        }
        apply_phase_and_producer_ids(&mut dataset, 0, 0);
        dataset.sort_unstable();
        self.load_keys = dataset;
        Ok(())
    }

    /// Register a named list of keys to insert. The keys will be inserted in the given
    /// order by phases whose insert distribution is `custom` with a matching name.
    pub fn add_custom_insert_list(&mut self, name: &str, to_insert: Vec<Key>) -> Result<(), Error> {
        if to_insert.is_empty() {
            return Err(Error::config("the custom insert list must not be empty"));
        }
        if to_insert.iter().any(|key| *key > MAX_KEY) {
            return Err(Error::config("the maximum supported key is 2^48 - 1"));
        }
        Arc::make_mut(&mut self.custom_inserts).insert(name.to_string(), to_insert);
        Ok(())
    }

    pub fn record_size_bytes(&self) -> Result<usize, Error> {
        self.config.record_size_bytes()
    }

    /// The tagged, ascending keys of the initial dataset.
    pub fn load_keys(&self) -> &[Key] {
        &self.load_keys
    }

    /// A bulk-load trace covering the initial dataset, for loading the store under test
    /// before the run. With `sort_requests`, records appear in ascending key order.
    pub fn load_trace(&self, sort_requests: bool) -> Result<BulkLoadTrace, Error> {
        let value_size = self.config.record_size_bytes()? - std::mem::size_of::<Key>();
        let mut prng = Xoshiro256PlusPlus::seed_from_u64(self.master_seed);
        Ok(BulkLoadTrace::from_keys(
            &self.load_keys,
            value_size,
            sort_requests,
            &mut prng,
        ))
    }
}

impl Workload for PhasedWorkload {
    type Producer = Producer;

    /// Split the workload into producers. Each producer's stream is deterministic, and the
    /// producer id is folded into its seed so the streams differ from each other.
    fn producers(&self, num_producers: usize) -> Result<Vec<Producer>, Error> {
        if num_producers == 0 {
            return Err(Error::config("must use at least 1 producer"));
        }
        if num_producers > MAX_NUM_PRODUCERS {
            return Err(Error::config(format!(
                "too many producers (only {} are supported)",
                MAX_NUM_PRODUCERS
            )));
        }
        let value_size = self.config.record_size_bytes()? - std::mem::size_of::<Key>();
        let coordinator = Arc::new(WorkloadCoordinator::new(self.load_keys.clone()));
        let mut producers = Vec::with_capacity(num_producers);
        for id in 0..num_producers {
            let mut prng = Xoshiro256PlusPlus::seed_from_u64(self.master_seed ^ id as u64);
            let valuegen = ValueGenerator::new(value_size, NUM_UNIQUE_VALUES, &mut prng);
            producers.push(Producer {
                id: id as ProducerId,
                num_producers,
                config: self.config.clone(),
                coordinator: coordinator.clone(),
                custom_inserts: self.custom_inserts.clone(),
                prng,
                phases: Vec::new(),
                current_phase: 0,
                insert_keys: Vec::new(),
                next_insert_key_index: 0,
                insert_deletions: DeletionMap::new(),
                last_live_load: coordinator.num_load_keys(),
                valuegen,
                op_upper: 100,
            });
        }
        Ok(producers)
    }
}

// }}} phasedworkload

// {{{ producer

/// Emits one deterministic request stream for one worker across all phases.
pub struct Producer {
    id: ProducerId,
    num_producers: usize,
    config: Arc<WorkloadConfig>,
    coordinator: Arc<WorkloadCoordinator>,
    custom_inserts: Arc<HashMap<String, Vec<Key>>>,
    prng: Xoshiro256PlusPlus,

    phases: Vec<Phase>,
    current_phase: usize,

    /// All the keys this producer will eventually insert, materialized up front in phase
    /// order and already tagged.
    insert_keys: Vec<Key>,
    next_insert_key_index: usize,
    /// Physical index into `insert_keys` of each deleted insert key. Producer-local, so no
    /// lock is needed.
    insert_deletions: DeletionMap,
    /// The live load-key count observed at the last key choice; a decrease means other
    /// producers deleted load keys and the current phase's choosers must shrink to match.
    last_live_load: usize,

    valuegen: ValueGenerator,
    /// Exclusive upper bound of the operation-selection draw. 100 normally; clamped down to
    /// the delete threshold once the phase's insert budget is exhausted.
    op_upper: u32,
}

impl Producer {
    /// Materialize the phases and all insert keys, then set each phase's chooser item
    /// counts to the key space visible at its entry (the load keys plus every preceding
    /// phase's inserts).
    pub fn prepare(&mut self) -> Result<(), Error> {
        let num_phases = self.config.num_phases();
        self.phases.reserve(num_phases);
        for phase_id in 0..num_phases {
            self.phases
                .push(self.config.phase(phase_id as PhaseId, self.id, self.num_producers)?);
        }

        // Generate the inserts.
        let mut insert_index = 0;
        for phase in &mut self.phases {
            if phase.num_inserts == 0 {
                continue;
            }
            let num_inserts = phase.num_inserts as usize;
            if let Some(custom) = self.config.custom_inserts_for_phase(phase)? {
                let list = self.custom_inserts.get(&custom.name).ok_or_else(|| {
                    Error::config(format!("did not find inserts for '{}'", custom.name))
                })?;
                let offset = custom.offset as usize;
                if list.len() < offset || list.len() - offset < num_inserts {
                    return Err(Error::config(format!(
                        "not enough keys in '{}' to make all requested inserts",
                        custom.name
                    )));
                }
                self.insert_keys
                    .extend_from_slice(&list[offset..offset + num_inserts]);
            } else {
                let generator = self.config.phase_generator(phase)?.ok_or_else(|| {
                    Error::config(format!("phase {} is missing an insert distribution", phase.id))
                })?;
                self.insert_keys.resize(insert_index + num_inserts, 0);
                generator.generate_into(&mut self.prng, &mut self.insert_keys[insert_index..]);
            }
            // Tag with phase_id + 1 because tag 0 is reserved for the initial load.
            apply_phase_and_producer_ids(
                &mut self.insert_keys[insert_index..],
                phase.id + 1,
                self.id + 1,
            );
            insert_index = self.insert_keys.len();
        }

        // Set the phase chooser item counts based on the number of inserts the producer
        // will make in each phase.
        let mut count = self.coordinator.num_load_keys();
        for phase in &mut self.phases {
            if count == 0 && phase.has_choosers() {
                return Err(Error::config(format!(
                    "phase {} has access operations but no keys are visible at its entry",
                    phase.id
                )));
            }
            phase.set_item_count(count);
            count += phase.num_inserts as usize;
        }

        debug!(
            "producer {} prepared: {} phases, {} inserts",
            self.id,
            num_phases,
            self.insert_keys.len()
        );
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        self.current_phase < self.phases.len() && self.phases[self.current_phase].has_next()
    }

    /// Choose an existing key for `op` under the shared coordination lock.
    ///
    /// The live load-key count is re-observed first; if it shrank since the last choice
    /// (another producer deleted load keys), the current phase's choosers shrink to match
    /// before the draw. An index below the live load count resolves through the shared
    /// deletion index into the load keys; anything above resolves into this producer's
    /// insert keys through the local deletion index.
    ///
    /// With `record_deletion`, the chosen key is additionally marked deleted so that no later
    /// choice can return it.
    #[allow(clippy::too_many_arguments)]
    fn choose_key(
        coordinator: &WorkloadCoordinator,
        insert_keys: &[Key],
        insert_deletions: &mut DeletionMap,
        last_live_load: &mut usize,
        prng: &mut Xoshiro256PlusPlus,
        phase: &mut Phase,
        op: Operation,
        record_deletion: bool,
    ) -> Key {
        let mut guard = coordinator.lock();
        let live = guard.live_load_count();
        if live < *last_live_load {
            phase.shrink_item_count(*last_live_load - live);
        }
        *last_live_load = live;

        let index = phase.chooser_mut(op).next(prng);
        if index < live {
            if record_deletion {
                guard.delete_at_logical(index)
            } else {
                guard.key_at_logical(index)
            }
        } else {
            // The index lands in this producer's insert space, which needs no lock.
            drop(guard);
            let logical = index - live;
            let physical = logical_to_physical(insert_deletions, logical);
            let key = insert_keys[physical];
            if record_deletion {
                let ordinal = insert_deletions.len() + 1;
                insert_deletions.insert(physical, ordinal);
                phase.shrink_item_count(1);
            }
            key
        }
    }

    /// Produce the next request of the stream.
    pub fn next(&mut self) -> Request {
        assert!(self.has_next(), "the producer has no requests left");
        let phase = &mut self.phases[self.current_phase];

        // If there are more requests left than inserts, randomly decide what to do next;
        // otherwise every remaining request must be an insert to honor the budget.
        let mut op = Operation::Insert;
        if phase.num_inserts_left < phase.num_requests_left {
            let choice = self.prng.gen_range(0..self.op_upper);
            op = if choice < phase.read_thres {
                Operation::Read
            } else if choice < phase.rmw_thres {
                Operation::ReadModifyWrite
            } else if choice < phase.negativeread_thres {
                Operation::NegativeRead
            } else if choice < phase.scan_thres {
                Operation::Scan
            } else if choice < phase.update_thres {
                Operation::Update
            } else if choice < phase.delete_thres {
                Operation::Delete
            } else {
                debug_assert!(phase.num_inserts_left > 0);
                Operation::Insert
            };
        }

        let request = match op {
            Operation::Read => {
                let key = Self::choose_key(
                    &self.coordinator,
                    &self.insert_keys,
                    &mut self.insert_deletions,
                    &mut self.last_live_load,
                    &mut self.prng,
                    phase,
                    op,
                    false,
                );
                Request::new(op, key)
            }

            Operation::NegativeRead => {
                let key = Self::choose_key(
                    &self.coordinator,
                    &self.insert_keys,
                    &mut self.insert_deletions,
                    &mut self.last_live_load,
                    &mut self.prng,
                    phase,
                    op,
                    false,
                );
                // Overwrite the phase byte with 0xFF: no loaded or inserted key carries this
                // tag, so the lookup is guaranteed to miss.
                Request::new(op, key | (0xFF << 8))
            }

            Operation::Scan => {
                let key = Self::choose_key(
                    &self.coordinator,
                    &self.insert_keys,
                    &mut self.insert_deletions,
                    &mut self.last_live_load,
                    &mut self.prng,
                    phase,
                    op,
                    false,
                );
                let length_chooser = match phase.scan_length_chooser.as_mut() {
                    Some(chooser) => chooser,
                    None => unreachable!("scan drawn without a scan length chooser"),
                };
                // Add 1 to the chosen length because choosers return values in a 0-based
                // range.
                let scan_amount = length_chooser.next(&mut self.prng) as u64 + 1;
                Request {
                    op,
                    key,
                    scan_amount,
                    value: None,
                }
            }

            Operation::Update | Operation::ReadModifyWrite => {
                let key = Self::choose_key(
                    &self.coordinator,
                    &self.insert_keys,
                    &mut self.insert_deletions,
                    &mut self.last_live_load,
                    &mut self.prng,
                    phase,
                    op,
                    false,
                );
                Request {
                    op,
                    key,
                    scan_amount: 0,
                    value: Some(self.valuegen.next_value()),
                }
            }

            Operation::Delete => {
                let key = Self::choose_key(
                    &self.coordinator,
                    &self.insert_keys,
                    &mut self.insert_deletions,
                    &mut self.last_live_load,
                    &mut self.prng,
                    phase,
                    op,
                    true,
                );
                Request::new(op, key)
            }

            Operation::Insert => {
                let key = self.insert_keys[self.next_insert_key_index];
                self.next_insert_key_index += 1;
                phase.num_inserts_left -= 1;
                phase.grow_item_count(1);
                if phase.num_inserts_left == 0 {
                    if phase.delete_thres > 0 {
                        // No inserts left: clamp the operation draw so that inserts can no
                        // longer be selected during this phase.
                        self.op_upper = phase.delete_thres;
                    } else {
                        // Only reachable in an insert-only phase, where this must have been
                        // the final request.
                        debug_assert_eq!(phase.num_requests_left, 1);
                    }
                }
                Request {
                    op,
                    key,
                    scan_amount: 0,
                    value: Some(self.valuegen.next_value()),
                }
            }
        };

        // Advance to the next request, and to the next phase when this one is drained.
        phase.num_requests_left -= 1;
        if phase.num_requests_left == 0 {
            self.current_phase += 1;
            if self.current_phase < self.phases.len() {
                let guard = self.coordinator.lock();
                let count = self.coordinator.num_load_keys() + self.insert_keys.len()
                    - guard.num_deletions()
                    - self.insert_deletions.len();
                self.phases[self.current_phase].set_item_count(count);
            }
            self.op_upper = 100;
        }
        request
    }
}

impl WorkloadProducer for Producer {
    fn prepare(&mut self) -> Result<(), Error> {
        Producer::prepare(self)
    }

    fn has_next(&self) -> bool {
        Producer::has_next(self)
    }

    fn next(&mut self) -> Request {
        Producer::next(self)
    }
}

// }}} producer

// {{{ tests


// }}} tests
