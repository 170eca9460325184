//! Error kinds for the analysis engine.
//!
//! Policies enforced at the seams:
//! - Provider failures abort the current analysis; nothing is cached
//! - Cache read failures degrade to a miss; write failures are logged
//! - Per-file filesystem failures skip the file; the analysis continues
//! - Config errors are fatal at load time, never mid-analysis
//! - Cancellation discards partial state

use std::path::PathBuf;

/// Failure kinds that callers need to distinguish programmatically.
///
/// Orchestration code wraps these in `anyhow::Error` with added context;
/// use [`is_cancelled`] to detect cancellation through the wrapping.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("history provider failed: {0}")]
    Provider(String),

    #[error("cache backend failed: {0}")]
    Cache(String),

    #[error("filesystem error on {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("analysis cancelled")]
    Cancelled,
}

/// True when `err` is (or wraps) a cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)))
}
