//! Unified error types for taskmill.

use std::time::Duration;

use thiserror::Error;

/// The main error type for taskmill operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool has been shut down and no longer accepts submissions.
    #[error("pool is shut down; submission rejected")]
    RejectedExecution,

    /// A worker-side channel closed unexpectedly while a blocking wait was
    /// in progress. Continuing after this would corrupt the slot accounting,
    /// so it is surfaced rather than swallowed.
    #[error("worker channel disconnected during {0}")]
    Disconnected(&'static str),

    /// No idle worker slot became available within the configured timeout.
    /// The pool has been forcibly shut down; recover unstarted inputs via
    /// `join_with_timeout`.
    #[error("no idle worker within {0:?}; pool forcibly shut down")]
    SubmitTimeout(Duration),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
