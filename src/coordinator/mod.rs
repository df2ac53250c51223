//! Orchestration of the lock and download phases.
//!
//! Both phases fan their work out over a [`WorkerPool`]:
//!
//! - [`lock_files`] resolves every target of every definition, fetches and
//!   hashes each one, and records first-seen digests. Any failure aborts the
//!   phase and the lock file is left untouched.
//! - [`download_files`] fetches the host's target of each definition and
//!   verifies it against the pinned digest while writing. Failures are
//!   collected per file and the remaining files still run.

mod download_phase;
mod lock_phase;
mod pool;

use std::path::PathBuf;

use crate::archive::ArchiveError;
use crate::fetch::TransportError;
use crate::hash::HashError;
use crate::lock::LockError;
use crate::template::TemplateError;

pub use download_phase::{DownloadOptions, DownloadReport, FileOutcome, download_files};
pub use lock_phase::{LockOutcome, lock_files};
pub use pool::{Cancellation, WorkerPool};

/// Failure of a single target within a phase.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The URL template could not be expanded.
    #[error("file '{file_id}': {source}")]
    Template {
        /// The file identifier.
        file_id: String,
        /// The template failure.
        source: TemplateError,
    },

    /// The remote content could not be retrieved.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The lock store rejected or lacked the digest.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Content could not be verified or written.
    #[error("{url}: {source}")]
    Verify {
        /// The resolved URL.
        url: String,
        /// The hashing failure.
        source: HashError,
    },

    /// Archive extraction failed.
    #[error("file '{file_id}': {source}")]
    Archive {
        /// The file identifier.
        file_id: String,
        /// The extraction failure.
        source: ArchiveError,
    },

    /// The URL has no file name to derive a destination from.
    #[error("cannot derive a file name from {url}; set a destination")]
    NoFileName {
        /// The resolved URL.
        url: String,
    },

    /// Local filesystem work around the fetch failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path being worked on.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The target was abandoned because another target already failed.
    #[error("cancelled after an earlier failure")]
    Cancelled,
}

impl TargetError {
    /// Wraps a hashing failure for `url`, reporting stream read failures as
    /// transport errors.
    pub(crate) fn from_hash(url: &str, err: HashError) -> Self {
        match err {
            HashError::Read(source) => Self::Transport(TransportError::Body {
                url: url.to_owned(),
                source,
            }),
            source => Self::Verify {
                url: url.to_owned(),
                source,
            },
        }
    }
}

/// The last path segment of `url`, ignoring any query or fragment.
pub(crate) fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://dl.test/tool-1.0.tar.gz", Some("tool-1.0.tar.gz"))]
    #[case("https://dl.test/a/b.zip?token=1#frag", Some("b.zip"))]
    #[case("https://dl.test/dir/", None)]
    #[case("tool.txt", Some("tool.txt"))]
    fn url_file_name_takes_the_last_segment(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(url_file_name(url), expected);
    }

    #[test]
    fn read_failures_become_transport_errors() {
        let err = TargetError::from_hash(
            "https://dl.test/a",
            HashError::Read(std::io::Error::other("reset")),
        );
        assert!(matches!(err, TargetError::Transport(TransportError::Body { .. })));
    }
}
