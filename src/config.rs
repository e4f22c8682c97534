//! Declarative workload configuration.
//!
//! A workload is described in the TOML format: a `[load]` section for the initial dataset, an
//! ordered `[[run]]` list of phases, and an optional top-level `record_size_bytes`. Each phase
//! names its request budget and, per operation, a proportion and a key distribution:
//!
//! ```toml
//! record_size_bytes = 16
//!
//! [load]
//! num_records = 100000
//! distribution = { type = "uniform", range_min = 0, range_max = 999999 }
//!
//! [[run]]
//! num_requests = 1000000
//! read = { proportion_pct = 80, distribution = { type = "zipfian", theta = 0.99 } }
//! insert = { proportion_pct = 20, distribution = { type = "uniform", range_min = 1000000, range_max = 1999999 } }
//! ```
//!
//! The per-phase proportions must sum to exactly 100. Distribution admissibility follows the
//! operation kind: insert-side distributions are `uniform`, `hotspot`, `linspace`, and
//! `custom`; access-side distributions are `uniform`, `zipfian`, `zipfian_clustered`, and
//! `latest`. Note that `zipfian` scatters the hot keys across the key space; use
//! `zipfian_clustered` to keep them dense.
//!
//! Options in the configuration can be overridden via environment variables, the same way the
//! store configuration works.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::chooser::{
    Chooser, LatestChooser, ScatteredZipfianChooser, UniformChooser, ZipfianChooser,
};
use crate::error::Error;
use crate::keygen::{Generator, HotspotGenerator, KeyRange, LinspaceGenerator, UniformGenerator};
use crate::phase::{Phase, PhaseId, ProducerId};
use crate::Key;

/// The hard cap on phases per workload. Phase tags must fit a byte, with 0 reserved for the
/// initial load and 0xFF reserved for negative-read keys.
pub const MAX_NUM_PHASES: usize = 254;

/// The hard cap on producers per run; producer tags must fit a byte, with 0 reserved for the
/// initial load.
pub const MAX_NUM_PRODUCERS: usize = 254;

/// The smallest supported record size: an 8-byte key plus at least one value byte.
pub const MIN_RECORD_SIZE_BYTES: usize = 9;

// {{{ options

/// A key distribution, as written in a workload file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistOpt {
    /// Uniform. Access-side uniform needs no parameters; insert-side uniform draws distinct
    /// keys from `[range_min, range_max]`.
    Uniform {
        #[serde(skip_serializing_if = "Option::is_none")]
        range_min: Option<Key>,
        #[serde(skip_serializing_if = "Option::is_none")]
        range_max: Option<Key>,
    },
    /// Scattered Zipfian (access only). Same `salt` means same hot keys.
    Zipfian {
        theta: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        salt: Option<u64>,
    },
    /// Plain Zipfian (access only): hot keys cluster at the low end of the key space.
    ZipfianClustered { theta: f64 },
    /// Zipfian over recency (access only): the most recently inserted key is hottest.
    Latest { theta: f64 },
    /// Hot/cold mixture (insert only).
    Hotspot {
        range_min: Key,
        range_max: Key,
        hot_range_min: Key,
        hot_range_max: Key,
        hot_proportion_pct: u32,
    },
    /// Evenly spaced keys (insert only).
    Linspace { start_key: Key, step_size: u64 },
    /// Keys supplied externally (load or insert). Insert lists are referenced by `name`;
    /// the load dataset needs none.
    Custom {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
    },
}

impl DistOpt {
    fn type_name(&self) -> &'static str {
        match self {
            DistOpt::Uniform { .. } => "uniform",
            DistOpt::Zipfian { .. } => "zipfian",
            DistOpt::ZipfianClustered { .. } => "zipfian_clustered",
            DistOpt::Latest { .. } => "latest",
            DistOpt::Hotspot { .. } => "hotspot",
            DistOpt::Linspace { .. } => "linspace",
            DistOpt::Custom { .. } => "custom",
        }
    }
}

/// One operation's slice of a phase: its share of the mix and its key distribution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpOpt {
    pub proportion_pct: u32,
    pub distribution: DistOpt,
}

/// Scan carries an extra maximum length; scan lengths are drawn uniformly from
/// `[1, max_length + 1]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScanOpt {
    pub proportion_pct: u32,
    pub max_length: u64,
    pub distribution: DistOpt,
}

/// The `[load]` section: how the initial dataset is generated.
///
/// `num_records` may be omitted only when the distribution is `custom`, in which case the
/// dataset is supplied programmatically.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoadOpt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_records: Option<u64>,
    pub distribution: DistOpt,
}

/// One `[[run]]` phase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PhaseOpt {
    pub num_requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<OpOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readmodifywrite: Option<OpOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negativeread: Option<OpOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<OpOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<OpOpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<OpOpt>,
}

/// A whole workload file, deserialized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkloadOpt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_size_bytes: Option<usize>,
    pub load: LoadOpt,
    pub run: Vec<PhaseOpt>,
}

// }}} options

/// Name and offset of a custom insert list consumed by a phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomInserts {
    pub name: String,
    pub offset: u64,
}

/// A parsed and validated workload specification.
///
/// Structural validation happens at load time; per-phase semantic validation (proportion
/// sums, distribution admissibility, parameter ranges) happens when phases are materialized.
#[derive(Clone, Debug)]
pub struct WorkloadConfig {
    opt: WorkloadOpt,
    /// Overrides the record size in the file when nonzero.
    set_record_size_bytes: usize,
}

impl WorkloadConfig {
    /// Parse a workload from a TOML string. Setting `set_record_size_bytes` to a positive
    /// value overrides the record size specified in the file, if any.
    pub fn from_toml_str(text: &str, set_record_size_bytes: usize) -> Result<Self, Error> {
        let opt: WorkloadOpt = Figment::new()
            .merge(Toml::string(text))
            .merge(Env::raw())
            .extract()
            .map_err(|e| Error::config(e.to_string()))?;
        Self::new(opt, set_record_size_bytes)
    }

    /// Parse a workload from a TOML file.
    pub fn load_from(
        path: impl AsRef<std::path::Path>,
        set_record_size_bytes: usize,
    ) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, set_record_size_bytes)
    }

    pub fn new(opt: WorkloadOpt, set_record_size_bytes: usize) -> Result<Self, Error> {
        if opt.run.len() > MAX_NUM_PHASES {
            return Err(Error::config(format!(
                "too many workload phases (only {} are supported)",
                MAX_NUM_PHASES
            )));
        }
        if !opt.load.distribution_is_custom() && opt.load.num_records.is_none() {
            return Err(Error::config(
                "the load section needs num_records unless the distribution is custom",
            ));
        }
        Ok(Self {
            opt,
            set_record_size_bytes,
        })
    }

    /// Serialize the configuration back to TOML. Parsing the output yields an equivalent
    /// configuration.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string(&self.opt).map_err(|e| Error::config(e.to_string()))
    }

    pub fn opt(&self) -> &WorkloadOpt {
        &self.opt
    }

    /// Whether the initial dataset is supplied programmatically rather than generated.
    pub fn using_custom_dataset(&self) -> bool {
        self.opt.load.distribution_is_custom()
    }

    pub fn num_load_records(&self) -> u64 {
        if self.using_custom_dataset() {
            return 0;
        }
        self.opt.load.num_records.unwrap_or(0)
    }

    /// The configured record size in bytes; the loader-supplied override wins over the file.
    pub fn record_size_bytes(&self) -> Result<usize, Error> {
        let record_size_bytes = match self.opt.record_size_bytes {
            Some(size) => size,
            None if self.set_record_size_bytes != 0 => self.set_record_size_bytes,
            None => return Err(Error::config("no record size was specified")),
        };
        if record_size_bytes < MIN_RECORD_SIZE_BYTES {
            return Err(Error::config(format!(
                "record sizes must be at least {} bytes",
                MIN_RECORD_SIZE_BYTES
            )));
        }
        Ok(record_size_bytes)
    }

    /// The generator for the initial dataset.
    pub fn load_generator(&self) -> Result<Generator, Error> {
        if self.using_custom_dataset() {
            return Err(Error::config(
                "cannot create a load generator when a custom dataset is being used",
            ));
        }
        make_generator(
            &self.opt.load.distribution,
            self.num_load_records() as usize,
        )
    }

    pub fn num_phases(&self) -> usize {
        self.opt.run.len()
    }

    /// Materialize one producer's view of a phase: its request/insert budgets, cumulative
    /// thresholds, and freshly built choosers.
    ///
    /// Chooser item counts start at a placeholder value of 1; the producer sets them to the
    /// actually visible key space during preparation.
    pub fn phase(
        &self,
        phase_id: PhaseId,
        producer_id: ProducerId,
        num_producers: usize,
    ) -> Result<Phase, Error> {
        let phase_opt = self
            .opt
            .run
            .get(phase_id as usize)
            .ok_or_else(|| Error::config(format!("nonexistent phase id: {}", phase_id)))?;

        let mut phase = Phase::new(phase_id);

        // This producer's slice of the phase's request budget.
        let total_requests = phase_opt.num_requests;
        phase.num_requests = total_requests / num_producers as u64;
        if (producer_id as u64) < total_requests % num_producers as u64 {
            phase.num_requests += 1;
        }
        phase.num_requests_left = phase.num_requests;

        let mut insert_pct = 0u32;
        if let Some(read) = &phase_opt.read {
            phase.read_thres = read.proportion_pct;
            phase.read_chooser = Some(make_chooser(&read.distribution, "read")?);
        }
        if let Some(rmw) = &phase_opt.readmodifywrite {
            phase.rmw_thres = rmw.proportion_pct;
            phase.rmw_chooser = Some(make_chooser(&rmw.distribution, "readmodifywrite")?);
        }
        if let Some(negativeread) = &phase_opt.negativeread {
            phase.negativeread_thres = negativeread.proportion_pct;
            phase.negativeread_chooser =
                Some(make_chooser(&negativeread.distribution, "negativeread")?);
        }
        if let Some(scan) = &phase_opt.scan {
            phase.scan_thres = scan.proportion_pct;
            if scan.max_length == 0 {
                return Err(Error::config("the maximum scan length must be at least 1"));
            }
            phase.max_scan_length = scan.max_length;
            phase.scan_chooser = Some(make_chooser(&scan.distribution, "scan")?);
            // Add 1 because choosers draw from a 0-based exclusive upper range.
            phase.scan_length_chooser =
                Some(UniformChooser::new(scan.max_length as usize + 1));
        }
        if let Some(update) = &phase_opt.update {
            phase.update_thres = update.proportion_pct;
            phase.update_chooser = Some(make_chooser(&update.distribution, "update")?);
        }
        if let Some(delete) = &phase_opt.delete {
            phase.delete_thres = delete.proportion_pct;
            phase.delete_chooser = Some(make_chooser(&delete.distribution, "delete")?);
        }
        if let Some(insert) = &phase_opt.insert {
            insert_pct = insert.proportion_pct;
        }

        let sum = insert_pct
            + phase.read_thres
            + phase.rmw_thres
            + phase.negativeread_thres
            + phase.scan_thres
            + phase.update_thres
            + phase.delete_thres;
        if sum != 100 {
            return Err(Error::config(
                "request proportions must sum to exactly 100%",
            ));
        }

        // The cumulative encoding below stacks delete directly on read, which cannot
        // express a mix of delete with the operations in between.
        if phase.delete_thres > 0
            && phase.rmw_thres + phase.negativeread_thres + phase.scan_thres + phase.update_thres
                > 0
        {
            return Err(Error::config(
                "delete can only be mixed with read and insert within a phase",
            ));
        }

        phase.num_inserts = phase.num_requests * insert_pct as u64 / 100;
        phase.num_inserts_left = phase.num_inserts;

        // Turn the proportions into cumulative thresholds for comparison against a U[0, 100)
        // draw. Delete stacks directly on read; insert is the residual above delete.
        phase.delete_thres += phase.read_thres;
        phase.rmw_thres += phase.read_thres;
        phase.negativeread_thres += phase.rmw_thres;
        phase.scan_thres += phase.negativeread_thres;
        phase.update_thres += phase.scan_thres;

        Ok(phase)
    }

    /// The generator producing this phase's insert keys, if the phase inserts and does not
    /// use a custom insert list.
    pub fn phase_generator(&self, phase: &Phase) -> Result<Option<Generator>, Error> {
        let phase_opt = self
            .opt
            .run
            .get(phase.id as usize)
            .ok_or_else(|| Error::config(format!("nonexistent phase id: {}", phase.id)))?;
        let insert = match &phase_opt.insert {
            Some(insert) if phase.num_inserts > 0 => insert,
            _ => return Ok(None),
        };
        if matches!(insert.distribution, DistOpt::Custom { .. }) {
            return Ok(None);
        }
        make_generator(&insert.distribution, phase.num_inserts as usize).map(Some)
    }

    /// The name and offset of the custom insert list this phase consumes, if any.
    pub fn custom_inserts_for_phase(&self, phase: &Phase) -> Result<Option<CustomInserts>, Error> {
        let phase_opt = self
            .opt
            .run
            .get(phase.id as usize)
            .ok_or_else(|| Error::config(format!("nonexistent phase id: {}", phase.id)))?;
        let insert = match &phase_opt.insert {
            Some(insert) if phase.num_inserts > 0 => insert,
            _ => return Ok(None),
        };
        match &insert.distribution {
            DistOpt::Custom { name, offset } => {
                let name = name
                    .clone()
                    .ok_or_else(|| Error::config("missing custom insert name"))?;
                Ok(Some(CustomInserts {
                    name,
                    offset: offset.unwrap_or(0),
                }))
            }
            _ => Ok(None),
        }
    }
}

impl LoadOpt {
    fn distribution_is_custom(&self) -> bool {
        matches!(self.distribution, DistOpt::Custom { .. })
    }
}

fn validate_theta(theta: f64) -> Result<(), Error> {
    if theta <= 0.0 || theta >= 1.0 {
        return Err(Error::config(
            "zipfian theta must be in the exclusive range (0, 1)",
        ));
    }
    Ok(())
}

/// Build an access-side chooser. Item counts start at 1 and are set for real during producer
/// preparation.
fn make_chooser(dist: &DistOpt, operation_name: &str) -> Result<Chooser, Error> {
    const INITIAL_ITEM_COUNT: usize = 1;
    match dist {
        DistOpt::Uniform { .. } => Ok(Chooser::Uniform(UniformChooser::new(INITIAL_ITEM_COUNT))),
        DistOpt::Zipfian { theta, salt } => {
            validate_theta(*theta)?;
            Ok(Chooser::ScatteredZipfian(ScatteredZipfianChooser::new(
                INITIAL_ITEM_COUNT,
                *theta,
                salt.unwrap_or(0),
            )))
        }
        DistOpt::ZipfianClustered { theta } => {
            validate_theta(*theta)?;
            Ok(Chooser::Zipfian(ZipfianChooser::new(
                INITIAL_ITEM_COUNT,
                *theta,
            )))
        }
        DistOpt::Latest { theta } => {
            validate_theta(*theta)?;
            Ok(Chooser::Latest(LatestChooser::new(
                INITIAL_ITEM_COUNT,
                *theta,
            )))
        }
        other => Err(Error::config(format!(
            "unsupported {} distribution: {}",
            operation_name,
            other.type_name()
        ))),
    }
}

/// Build an insert-side (or load) generator.
fn make_generator(dist: &DistOpt, num_keys: usize) -> Result<Generator, Error> {
    match dist {
        DistOpt::Uniform {
            range_min,
            range_max,
        } => {
            let (min, max) = match (range_min, range_max) {
                (Some(min), Some(max)) => (*min, *max),
                _ => {
                    return Err(Error::config(
                        "a uniform generator needs range_min and range_max",
                    ))
                }
            };
            let range = KeyRange::new(min, max)?;
            Ok(Generator::Uniform(UniformGenerator::new(num_keys, range)?))
        }
        DistOpt::Hotspot {
            range_min,
            range_max,
            hot_range_min,
            hot_range_max,
            hot_proportion_pct,
        } => {
            let overall = KeyRange::new(*range_min, *range_max)?;
            let hot = KeyRange::new(*hot_range_min, *hot_range_max)?;
            Ok(Generator::Hotspot(HotspotGenerator::new(
                num_keys,
                *hot_proportion_pct,
                overall,
                hot,
            )?))
        }
        DistOpt::Linspace {
            start_key,
            step_size,
        } => Ok(Generator::Linspace(LinspaceGenerator::new(
            num_keys, *start_key, *step_size,
        )?)),
        other => Err(Error::config(format!(
            "unsupported load/insert distribution: {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        record_size_bytes = 16

        [load]
        num_records = 1000
        distribution = { type = "uniform", range_min = 0, range_max = 9999 }

        [[run]]
        num_requests = 1000
        read = { proportion_pct = 70, distribution = { type = "zipfian", theta = 0.99 } }
        update = { proportion_pct = 10, distribution = { type = "uniform" } }
        insert = { proportion_pct = 20, distribution = { type = "uniform", range_min = 10000, range_max = 19999 } }

        [[run]]
        num_requests = 500
        read = { proportion_pct = 95, distribution = { type = "latest", theta = 0.5 } }
        scan = { proportion_pct = 5, max_length = 10, distribution = { type = "zipfian_clustered", theta = 0.9 } }
    "#;

    #[test]
    fn parses_example() {
        let config = WorkloadConfig::from_toml_str(EXAMPLE, 0).unwrap();
        assert_eq!(config.num_phases(), 2);
        assert_eq!(config.num_load_records(), 1000);
        assert_eq!(config.record_size_bytes().unwrap(), 16);
        assert!(!config.using_custom_dataset());
    }

    #[test]
    fn phase_materialization() {
        let config = WorkloadConfig::from_toml_str(EXAMPLE, 0).unwrap();
        let phase = config.phase(0, 0, 1).unwrap();
        assert_eq!(phase.num_requests, 1000);
        assert_eq!(phase.num_inserts, 200);
        assert_eq!(phase.read_thres, 70);
        assert_eq!(phase.rmw_thres, 70);
        assert_eq!(phase.negativeread_thres, 70);
        assert_eq!(phase.scan_thres, 70);
        assert_eq!(phase.update_thres, 80);
        assert_eq!(phase.delete_thres, 70);
        assert!(phase.read_chooser.is_some());
        assert!(phase.update_chooser.is_some());
        assert!(phase.delete_chooser.is_none());
        assert!(config.phase_generator(&phase).unwrap().is_some());
        assert!(config.custom_inserts_for_phase(&phase).unwrap().is_none());
    }

    #[test]
    fn per_producer_request_partition() {
        let config = WorkloadConfig::from_toml_str(EXAMPLE, 0).unwrap();
        // 1000 requests over 3 producers: 334, 333, 333.
        let counts: Vec<u64> = (0..3u8)
            .map(|p| config.phase(0, p, 3).unwrap().num_requests)
            .collect();
        assert_eq!(counts, vec![334, 333, 333]);
        assert_eq!(counts.iter().sum::<u64>(), 1000);
    }

    #[test]
    fn proportions_must_sum_to_100() {
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            read = { proportion_pct = 70, distribution = { type = "uniform" } }
            update = { proportion_pct = 40, distribution = { type = "uniform" } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        assert!(config.phase(0, 0, 1).is_err());
    }

    #[test]
    fn theta_bounds() {
        for (theta, ok) in [("0.0001", true), ("0.9999", true), ("0.0", false), ("1.0", false)] {
            let text = format!(
                r#"
                [load]
                num_records = 10
                distribution = {{ type = "uniform", range_min = 0, range_max = 99 }}

                [[run]]
                num_requests = 100
                read = {{ proportion_pct = 100, distribution = {{ type = "zipfian", theta = {} }} }}
                "#,
                theta
            );
            let config = WorkloadConfig::from_toml_str(&text, 16).unwrap();
            assert_eq!(config.phase(0, 0, 1).is_ok(), ok, "theta = {}", theta);
        }
    }

    #[test]
    fn record_size_rules() {
        let config = WorkloadConfig::from_toml_str(EXAMPLE, 0).unwrap();
        assert_eq!(config.record_size_bytes().unwrap(), 16);

        let no_size = EXAMPLE.replace("record_size_bytes = 16", "");
        let config = WorkloadConfig::from_toml_str(&no_size, 0).unwrap();
        assert!(config.record_size_bytes().is_err());
        let config = WorkloadConfig::from_toml_str(&no_size, 64).unwrap();
        assert_eq!(config.record_size_bytes().unwrap(), 64);
        let config = WorkloadConfig::from_toml_str(&no_size, 8).unwrap();
        assert!(config.record_size_bytes().is_err());
    }

    #[test]
    fn admissibility_matrix() {
        // Zipfian as an insert distribution is rejected.
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            insert = { proportion_pct = 100, distribution = { type = "zipfian", theta = 0.9 } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        let phase = config.phase(0, 0, 1).unwrap();
        assert!(config.phase_generator(&phase).is_err());

        // Hotspot as an access distribution is rejected.
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            read = { proportion_pct = 100, distribution = { type = "hotspot", range_min = 0, range_max = 99, hot_range_min = 0, hot_range_max = 9, hot_proportion_pct = 90 } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        assert!(config.phase(0, 0, 1).is_err());
    }

    #[test]
    fn scan_needs_positive_max_length() {
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            scan = { proportion_pct = 100, max_length = 0, distribution = { type = "uniform" } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        assert!(config.phase(0, 0, 1).is_err());
    }

    #[test]
    fn too_many_phases_rejected() {
        let mut text = String::from(
            r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }
            "#,
        );
        for _ in 0..255 {
            text.push_str(
                r#"
                [[run]]
                num_requests = 1
                read = { proportion_pct = 100, distribution = { type = "uniform" } }
                "#,
            );
        }
        assert!(WorkloadConfig::from_toml_str(&text, 16).is_err());
    }

    #[test]
    fn delete_mixes_only_with_read_and_insert() {
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            read = { proportion_pct = 40, distribution = { type = "uniform" } }
            update = { proportion_pct = 30, distribution = { type = "uniform" } }
            delete = { proportion_pct = 30, distribution = { type = "uniform" } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        assert!(config.phase(0, 0, 1).is_err());

        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            read = { proportion_pct = 50, distribution = { type = "uniform" } }
            delete = { proportion_pct = 20, distribution = { type = "uniform" } }
            insert = { proportion_pct = 30, distribution = { type = "linspace", start_key = 1000, step_size = 1 } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        let phase = config.phase(0, 0, 1).unwrap();
        assert_eq!(phase.delete_thres, 70);
        assert_eq!(phase.num_inserts, 30);
    }

    #[test]
    fn custom_insert_info() {
        let text = r#"
            [load]
            num_records = 10
            distribution = { type = "uniform", range_min = 0, range_max = 99 }

            [[run]]
            num_requests = 100
            insert = { proportion_pct = 100, distribution = { type = "custom", name = "mykeys", offset = 5 } }
        "#;
        let config = WorkloadConfig::from_toml_str(text, 16).unwrap();
        let phase = config.phase(0, 0, 1).unwrap();
        assert!(config.phase_generator(&phase).unwrap().is_none());
        let info = config.custom_inserts_for_phase(&phase).unwrap().unwrap();
        assert_eq!(info.name, "mykeys");
        assert_eq!(info.offset, 5);
    }

    #[test]
    fn toml_round_trip() {
        let config = WorkloadConfig::from_toml_str(EXAMPLE, 0).unwrap();
        let serialized = config.to_toml_string().unwrap();
        let reparsed = WorkloadConfig::from_toml_str(&serialized, 0).unwrap();
        assert_eq!(config.opt(), reparsed.opt());
    }
}
