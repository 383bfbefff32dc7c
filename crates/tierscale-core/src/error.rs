//! Error taxonomy for remote operations.

use thiserror::Error;

use crate::types::WorkerId;

/// Result type alias for operations that may cross a process boundary.
pub type OpsResult<T> = Result<T, OpsError>;

/// Errors surfaced by coordinator, cache, backing-store and harness calls.
///
/// A business-level negative (queue refused, retirement denied, purchase
/// rejected) is `Ok(false)`, never an error.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Transport failure or a directory that has not been bound yet.
    /// Callers log and carry on where they have a sane fallback.
    #[error("remote endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("remote call failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Codec(String),

    #[error("worker {0} has no assigned role")]
    UnknownWorker(WorkerId),

    /// The operation is not implemented by the wired backing; this is a
    /// configuration error, not a negative result.
    #[error("operation not supported by this backing: {0}")]
    Unsupported(String),

    #[error("harness error: {0}")]
    Harness(String),
}

impl OpsError {
    /// Whether the error is worth treating as transient by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, OpsError::Unreachable(_) | OpsError::Remote { .. })
    }
}
