//! Error types surfaced by the harness.

use thiserror::Error;

/// Everything that can go wrong while loading a workload or driving a benchmark.
///
/// Configuration problems surface when the workload is loaded or when producers prepare.
/// Operation-level store failures are normally counted into the failed-operation counters and
/// only become errors when the run options demand success.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed workload or store configuration: unknown distribution, missing field,
    /// proportions not summing to 100, parameter out of range, and the like.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A database operation reported failure while `expect_request_success` was set.
    #[error("{op} request failed (expected to succeed)")]
    RequestFailed { op: &'static str },

    /// A range scan returned fewer records than requested while `expect_scan_amount_found`
    /// was set.
    #[error("a range scan returned {returned} of {requested} requested records")]
    ScanShortfall { requested: u64, returned: usize },

    /// The session has already been terminated; no further work can be dispatched.
    #[error("benchmark session already terminated")]
    Terminated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
