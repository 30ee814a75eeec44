// Error taxonomy for authprobe
// Nothing here is fatal to the process: the worst case is an incomplete
// scan with partial results, still reported as complete.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the scan engine itself
#[derive(Error, Debug)]
pub enum ScanError {
    /// Only one run may be active at a time; starting a second is reported,
    /// not queued.
    #[error("a scan is already running")]
    AlreadyRunning,

    /// The request source failed while enumerating the transcript. Remaining
    /// submissions are aborted but completion is still signalled.
    #[error("transcript enumeration failed: {0}")]
    Enumeration(String),
}

/// Errors while ingesting capture logs
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read capture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed capture data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("no usable requests in {0}")]
    Empty(String),
}

/// Transport-level failures for a single probe. One failed unit never aborts
/// the run.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request could not be constructed: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest reports the elapsed timeout itself; the configured
            // duration is attached at the call site
            ExecutorError::Timeout(Duration::ZERO)
        } else if err.is_builder() || err.is_request() {
            ExecutorError::InvalidRequest(err.to_string())
        } else {
            ExecutorError::Transport(err.to_string())
        }
    }
}
