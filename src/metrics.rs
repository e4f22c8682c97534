//! Latency and throughput accounting.
//!
//! Each executor feeds a private [`MetricsTracker`]; at the end of a run the per-executor
//! trackers are merged into one [`BenchmarkResult`], which renders either as a CSV row (see
//! [`BenchmarkResult::write_csv`]) or human-readable via [`std::fmt::Display`].

use std::io::Write;
use std::time::Duration;

use quanta::Instant;

// {{{ meter

/// Accumulates byte, request, and record counts plus sampled latencies for one operation
/// class.
#[derive(Debug)]
pub struct Meter {
    bytes: u64,
    /// Number of requests processed.
    request_count: u64,
    /// Number of records processed. Differs from `request_count` for scans and bulk loads,
    /// which touch multiple records per request.
    record_count: u64,
    latencies: Vec<Duration>,
}

impl Meter {
    pub fn new(num_entries_hint: usize) -> Self {
        Self {
            bytes: 0,
            request_count: 0,
            record_count: 0,
            latencies: Vec::with_capacity(num_entries_hint),
        }
    }

    pub fn record(&mut self, run_time: Option<Duration>, bytes: u64) {
        self.record_multiple(run_time, bytes, 1);
    }

    pub fn record_multiple(&mut self, run_time: Option<Duration>, bytes: u64, records: u64) {
        if let Some(run_time) = run_time {
            self.latencies.push(run_time);
        }
        self.request_count += 1;
        self.bytes += bytes;
        self.record_count += records;
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn freeze(mut self) -> FrozenMeter {
        self.latencies.sort_unstable();
        FrozenMeter {
            bytes: self.bytes,
            request_count: self.request_count,
            record_count: self.record_count,
            latencies: self.latencies,
        }
    }

    /// Merge and freeze a group of meters, pooling their latency samples.
    pub fn freeze_group(meters: Vec<Meter>) -> FrozenMeter {
        let mut bytes = 0;
        let mut request_count = 0;
        let mut record_count = 0;
        let mut latencies =
            Vec::with_capacity(meters.iter().map(|m| m.latencies.len()).sum());
        for meter in meters {
            bytes += meter.bytes;
            request_count += meter.request_count;
            record_count += meter.record_count;
            latencies.extend_from_slice(&meter.latencies);
        }
        latencies.sort_unstable();
        FrozenMeter {
            bytes,
            request_count,
            record_count,
            latencies,
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new(100_000)
    }
}

/// A finalized meter with its latency samples sorted, ready for percentile queries.
#[derive(Debug, Default, Clone)]
pub struct FrozenMeter {
    bytes: u64,
    request_count: u64,
    record_count: u64,
    latencies: Vec<Duration>,
}

impl FrozenMeter {
    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn num_requests(&self) -> u64 {
        self.request_count
    }

    pub fn num_records(&self) -> u64 {
        self.record_count
    }

    pub fn latency_min(&self) -> Duration {
        self.latencies.first().copied().unwrap_or(Duration::ZERO)
    }

    pub fn latency_max(&self) -> Duration {
        self.latencies.last().copied().unwrap_or(Duration::ZERO)
    }

    pub fn latency_mean(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    /// Percentile latency for `percentile` in `[0.0, 1.0]` (0.99 is the 99th percentile).
    /// Returns zero when no latencies were sampled.
    pub fn latency_percentile(&self, percentile: f64) -> Duration {
        assert!(
            (0.0..=1.0).contains(&percentile),
            "percentile out of range (must be between 0.0 and 1.0 inclusive)"
        );
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let mut index = (percentile * self.latencies.len() as f64) as usize;
        if index == self.latencies.len() {
            index -= 1;
        }
        self.latencies[index]
    }
}

// }}} meter

// {{{ tracker

/// Throughput observed between two sampling points.
#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    records_processed: u64,
    elapsed: Duration,
}

impl ThroughputSample {
    pub fn num_records_processed(&self) -> u64 {
        self.records_processed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Throughput in millions of records processed per second.
    pub fn mrecords_per_second(&self) -> f64 {
        // records per microsecond is equivalent to mrecords per second
        self.records_processed as f64 / (self.elapsed.as_nanos() as f64 / 1_000.0)
    }
}

/// Per-executor metrics: one meter per operation class plus failure counters.
#[derive(Debug)]
pub struct MetricsTracker {
    reads: Meter,
    writes: Meter,
    scans: Meter,
    deletes: Meter,
    failed_reads: u64,
    failed_writes: u64,
    failed_scans: u64,
    failed_deletes: u64,
    read_xor: u32,

    last_count: u64,
    last_sample_time: Instant,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            reads: Meter::default(),
            writes: Meter::default(),
            scans: Meter::new(1_000),
            deletes: Meter::new(10_000),
            failed_reads: 0,
            failed_writes: 0,
            failed_scans: 0,
            failed_deletes: 0,
            read_xor: 0,
            last_count: 0,
            last_sample_time: Instant::now(),
        }
    }

    pub fn record_read(&mut self, run_time: Option<Duration>, read_bytes: u64, succeeded: bool) {
        if succeeded {
            self.reads.record(run_time, read_bytes);
        } else {
            self.failed_reads += 1;
        }
    }

    pub fn record_write(&mut self, run_time: Option<Duration>, write_bytes: u64, succeeded: bool) {
        if succeeded {
            self.writes.record(run_time, write_bytes);
        } else {
            self.failed_writes += 1;
        }
    }

    pub fn record_scan(
        &mut self,
        run_time: Option<Duration>,
        scanned_bytes: u64,
        scanned_amount: u64,
        succeeded: bool,
    ) {
        if succeeded {
            self.scans
                .record_multiple(run_time, scanned_bytes, scanned_amount);
        } else {
            self.failed_scans += 1;
        }
    }

    pub fn record_delete(&mut self, run_time: Option<Duration>, succeeded: bool) {
        if succeeded {
            // A delete neither reads nor writes payload bytes.
            self.deletes.record(run_time, 0);
        } else {
            self.failed_deletes += 1;
        }
    }

    /// Folds in the executor's accumulated read bytes, preventing the compiler (or the
    /// store) from eliding reads whose values are never otherwise inspected.
    pub fn set_read_xor(&mut self, value: u32) {
        self.read_xor = value;
    }

    /// Close the current throughput sampling window and open a new one.
    pub fn sample(&mut self) -> ThroughputSample {
        let now = Instant::now();
        let count = self.total_request_count();
        let result = ThroughputSample {
            records_processed: count - self.last_count,
            elapsed: now - self.last_sample_time,
        };
        self.last_count = count;
        self.last_sample_time = now;
        result
    }

    /// Start the first throughput sampling window.
    pub fn reset_sample(&mut self) {
        self.last_count = self.total_request_count();
        self.last_sample_time = Instant::now();
    }

    fn total_request_count(&self) -> u64 {
        self.reads.request_count()
            + self.writes.request_count()
            + self.scans.request_count()
            + self.deletes.request_count()
            + self.failed_reads
            + self.failed_writes
            + self.failed_scans
            + self.failed_deletes
    }

    pub fn finalize(self, total_run_time: Duration) -> BenchmarkResult {
        BenchmarkResult {
            run_time: total_run_time,
            reads: self.reads.freeze(),
            writes: self.writes.freeze(),
            scans: self.scans.freeze(),
            deletes: self.deletes.freeze(),
            failed_reads: self.failed_reads,
            failed_writes: self.failed_writes,
            failed_scans: self.failed_scans,
            failed_deletes: self.failed_deletes,
            read_xor: self.read_xor,
        }
    }

    /// Merge a group of per-executor trackers into one result.
    pub fn finalize_group(
        total_run_time: Duration,
        trackers: Vec<MetricsTracker>,
    ) -> BenchmarkResult {
        let mut reads = Vec::with_capacity(trackers.len());
        let mut writes = Vec::with_capacity(trackers.len());
        let mut scans = Vec::with_capacity(trackers.len());
        let mut deletes = Vec::with_capacity(trackers.len());
        let mut failed_reads = 0;
        let mut failed_writes = 0;
        let mut failed_scans = 0;
        let mut failed_deletes = 0;
        let mut read_xor = 0;
        for tracker in trackers {
            reads.push(tracker.reads);
            writes.push(tracker.writes);
            scans.push(tracker.scans);
            deletes.push(tracker.deletes);
            failed_reads += tracker.failed_reads;
            failed_writes += tracker.failed_writes;
            failed_scans += tracker.failed_scans;
            failed_deletes += tracker.failed_deletes;
            read_xor ^= tracker.read_xor;
        }
        BenchmarkResult {
            run_time: total_run_time,
            reads: Meter::freeze_group(reads),
            writes: Meter::freeze_group(writes),
            scans: Meter::freeze_group(scans),
            deletes: Meter::freeze_group(deletes),
            failed_reads,
            failed_writes,
            failed_scans,
            failed_deletes,
            read_xor,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

// }}} tracker

// {{{ result

/// The aggregated outcome of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    run_time: Duration,
    reads: FrozenMeter,
    writes: FrozenMeter,
    scans: FrozenMeter,
    deletes: FrozenMeter,
    failed_reads: u64,
    failed_writes: u64,
    failed_scans: u64,
    failed_deletes: u64,
    read_xor: u32,
}

impl BenchmarkResult {
    pub(crate) fn from_meters(
        run_time: Duration,
        reads: FrozenMeter,
        writes: FrozenMeter,
        scans: FrozenMeter,
        deletes: FrozenMeter,
    ) -> Self {
        Self {
            run_time,
            reads,
            writes,
            scans,
            deletes,
            failed_reads: 0,
            failed_writes: 0,
            failed_scans: 0,
            failed_deletes: 0,
            read_xor: 0,
        }
    }

    pub fn run_time(&self) -> Duration {
        self.run_time
    }

    pub fn reads(&self) -> &FrozenMeter {
        &self.reads
    }

    pub fn writes(&self) -> &FrozenMeter {
        &self.writes
    }

    pub fn scans(&self) -> &FrozenMeter {
        &self.scans
    }

    pub fn deletes(&self) -> &FrozenMeter {
        &self.deletes
    }

    pub fn num_failed_reads(&self) -> u64 {
        self.failed_reads
    }

    pub fn num_failed_writes(&self) -> u64 {
        self.failed_writes
    }

    pub fn num_failed_scans(&self) -> u64 {
        self.failed_scans
    }

    pub fn num_failed_deletes(&self) -> u64 {
        self.failed_deletes
    }

    fn total_requests(&self) -> u64 {
        self.reads.num_requests()
            + self.writes.num_requests()
            + self.scans.num_requests()
            + self.deletes.num_requests()
            + self.failed_reads
            + self.failed_writes
            + self.failed_scans
            + self.failed_deletes
    }

    pub fn krequests_per_second(&self) -> f64 {
        // requests per millisecond is equivalent to krequests per second
        self.total_requests() as f64 / (self.run_time.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn krecords_per_second(&self) -> f64 {
        let total_records = self.reads.num_records()
            + self.writes.num_records()
            + self.scans.num_records()
            + self.deletes.num_records();
        total_records as f64 / (self.run_time.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn read_mib_per_second(&self) -> f64 {
        let total_read = self.reads.total_bytes() + self.scans.total_bytes();
        let read_mib = total_read as f64 / 1024.0 / 1024.0;
        read_mib / self.run_time.as_secs_f64()
    }

    pub fn write_mib_per_second(&self) -> f64 {
        let write_mib = self.writes.total_bytes() as f64 / 1024.0 / 1024.0;
        write_mib / self.run_time.as_secs_f64()
    }

    pub fn write_csv_header(out: &mut impl Write) -> std::io::Result<()> {
        writeln!(
            out,
            "total_time,num_reads,num_writes,num_scans,num_deletes,\
             failed_reads,failed_writes,failed_scans,failed_deletes,\
             num_scanned_keys,reads_ns_p99,reads_ns_p50,writes_ns_p99,writes_ns_p50,\
             krequests_per_s,krecords_per_s,read_mib_per_s,write_mib_per_s"
        )
    }

    /// One CSV row; `total_time` is in microseconds and latency columns in nanoseconds.
    pub fn write_csv(&self, out: &mut impl Write, print_header: bool) -> std::io::Result<()> {
        if print_header {
            Self::write_csv_header(out)?;
        }
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.run_time.as_micros(),
            self.reads.num_requests(),
            self.writes.num_requests(),
            self.scans.num_requests(),
            self.deletes.num_requests(),
            self.failed_reads,
            self.failed_writes,
            self.failed_scans,
            self.failed_deletes,
            self.scans.num_records(),
            self.reads.latency_percentile(0.99).as_nanos(),
            self.reads.latency_percentile(0.5).as_nanos(),
            self.writes.latency_percentile(0.99).as_nanos(),
            self.writes.latency_percentile(0.5).as_nanos(),
            self.krequests_per_second(),
            self.krecords_per_second(),
            self.read_mib_per_second(),
            self.write_mib_per_second(),
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total run time (us):       {}", self.run_time.as_micros())?;
        writeln!(f, "Total read requests:       {}", self.reads.num_requests())?;
        writeln!(f, "Total write requests:      {}", self.writes.num_requests())?;
        writeln!(f, "Total scan requests:       {}", self.scans.num_requests())?;
        writeln!(f, "Total delete requests:     {}", self.deletes.num_requests())?;
        writeln!(f, "Failed reads:              {}", self.failed_reads)?;
        writeln!(f, "Failed writes:             {}", self.failed_writes)?;
        writeln!(f, "Failed scans:              {}", self.failed_scans)?;
        writeln!(f, "Failed deletes:            {}", self.failed_deletes)?;
        writeln!(f, "Total scanned records:     {}", self.scans.num_records())?;
        writeln!(f, "Throughput (krequests/s):  {:.2}", self.krequests_per_second())?;
        writeln!(f, "Throughput (krecords/s):   {:.2}", self.krecords_per_second())?;
        writeln!(f, "Read Throughput (MiB/s):   {:.2}", self.read_mib_per_second())?;
        writeln!(f, "Write Throughput (MiB/s):  {:.2}", self.write_mib_per_second())?;
        write!(f, "Read XOR (ignore):         {}", self.read_xor)
    }
}

// }}} result

// {{{ tests

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(n: u64) -> Duration {
        Duration::from_nanos(n)
    }

    #[test]
    fn meter_counts_and_percentiles() {
        let mut meter = Meter::new(16);
        for i in 1..=100u64 {
            meter.record(Some(ns(i * 10)), 8);
        }
        let frozen = meter.freeze();
        assert_eq!(frozen.num_requests(), 100);
        assert_eq!(frozen.num_records(), 100);
        assert_eq!(frozen.total_bytes(), 800);
        assert_eq!(frozen.latency_min(), ns(10));
        assert_eq!(frozen.latency_max(), ns(1000));
        assert_eq!(frozen.latency_percentile(0.5), ns(510));
        assert_eq!(frozen.latency_percentile(0.99), ns(1000));
        assert_eq!(frozen.latency_percentile(1.0), ns(1000));
        assert_eq!(frozen.latency_percentile(0.0), ns(10));
    }

    #[test]
    fn meter_without_samples_reports_zero() {
        let mut meter = Meter::new(4);
        meter.record(None, 100);
        let frozen = meter.freeze();
        assert_eq!(frozen.num_requests(), 1);
        assert_eq!(frozen.latency_percentile(0.99), Duration::ZERO);
        assert_eq!(frozen.latency_mean(), Duration::ZERO);
    }

    #[test]
    fn freeze_group_pools_latencies() {
        let mut a = Meter::new(4);
        let mut b = Meter::new(4);
        a.record(Some(ns(300)), 1);
        a.record(Some(ns(100)), 1);
        b.record(Some(ns(200)), 1);
        let frozen = Meter::freeze_group(vec![a, b]);
        assert_eq!(frozen.num_requests(), 3);
        assert_eq!(frozen.latency_min(), ns(100));
        assert_eq!(frozen.latency_max(), ns(300));
        assert_eq!(frozen.latency_percentile(0.5), ns(200));
    }

    #[test]
    fn scan_records_differ_from_requests() {
        let mut tracker = MetricsTracker::new();
        tracker.record_scan(Some(ns(500)), 1024, 10, true);
        tracker.record_scan(None, 0, 0, false);
        let result = tracker.finalize(Duration::from_secs(1));
        assert_eq!(result.scans().num_requests(), 1);
        assert_eq!(result.scans().num_records(), 10);
        assert_eq!(result.num_failed_scans(), 1);
    }

    #[test]
    fn finalize_group_aggregates() {
        let mut a = MetricsTracker::new();
        let mut b = MetricsTracker::new();
        a.record_read(Some(ns(100)), 8, true);
        a.record_read(None, 0, false);
        a.set_read_xor(0b1100);
        b.record_write(Some(ns(200)), 8, true);
        b.record_delete(Some(ns(50)), true);
        b.set_read_xor(0b1010);
        let result =
            MetricsTracker::finalize_group(Duration::from_millis(10), vec![a, b]);
        assert_eq!(result.reads().num_requests(), 1);
        assert_eq!(result.writes().num_requests(), 1);
        assert_eq!(result.deletes().num_requests(), 1);
        assert_eq!(result.num_failed_reads(), 1);
        assert_eq!(result.read_xor, 0b0110);
        // 4 requests over 10 ms.
        assert!((result.krequests_per_second() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn csv_shape() {
        let mut tracker = MetricsTracker::new();
        tracker.record_read(Some(ns(100)), 8, true);
        let result = tracker.finalize(Duration::from_secs(1));
        let mut out = Vec::new();
        result.write_csv(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert_eq!(
            header,
            "total_time,num_reads,num_writes,num_scans,num_deletes,failed_reads,\
             failed_writes,failed_scans,failed_deletes,num_scanned_keys,reads_ns_p99,\
             reads_ns_p50,writes_ns_p99,writes_ns_p50,krequests_per_s,krecords_per_s,\
             read_mib_per_s,write_mib_per_s"
        );
        let row = lines.next().unwrap();
        assert_eq!(row.split(',').count(), 18);
        assert!(row.starts_with("1000000,1,0,0,0,"));
    }

    #[test]
    fn throughput_sample_math() {
        let sample = ThroughputSample {
            records_processed: 5_000_000,
            elapsed: Duration::from_secs(1),
        };
        assert!((sample.mrecords_per_second() - 5.0).abs() < 1e-9);
        assert_eq!(sample.num_records_processed(), 5_000_000);
    }
}

// }}} tests
