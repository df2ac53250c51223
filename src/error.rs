//! Top-level error type for pinfetch runs.
//!
//! Each module owns a precise error enum; [`PinfetchError`] gathers them so
//! that callers driving a whole run can propagate with `?` and report a single
//! message.

use crate::config::ConfigError;
use crate::coordinator::TargetError;
use crate::lock::LockError;
use crate::platform::PlatformError;

/// Errors that end a pinfetch run.
#[derive(Debug, thiserror::Error)]
pub enum PinfetchError {
    /// The configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The host platform is not one pinfetch knows.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The lock file could not be loaded or saved.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A lock-phase target failed.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// One or more downloads failed.
    #[error("{failed} of {total} file(s) failed to download")]
    DownloadsFailed {
        /// Number of failed definitions.
        failed: usize,
        /// Number of definitions attempted.
        total: usize,
    },
}

/// Result type alias using [`PinfetchError`].
pub type Result<T> = std::result::Result<T, PinfetchError>;
