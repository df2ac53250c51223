//! Digest computation and verification.
//!
//! - [`HashAlgorithm`] names the supported digest functions.
//! - [`Digest`] is the pinned `(algorithm, bytes)` pair stored in the lock
//!   file.
//! - [`hash_reader`] and [`hash_file`] compute a digest from a stream.
//! - [`verify_to_path`] writes a stream to disk while hashing it and only
//!   exposes the file at its final path when the digest matches.

mod digest;
mod stream;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use sha2::{Digest as _, Sha256, Sha512};

pub use digest::Digest;
pub use stream::{hash_file, hash_reader, verify_to_path};

/// Errors raised while hashing or verifying content.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The algorithm name is not supported.
    #[error("unsupported hash algorithm '{name}' (supported: sha256, sha512)")]
    UnsupportedAlgorithm {
        /// The rejected algorithm name.
        name: String,
    },

    /// A textual digest could not be parsed.
    #[error("malformed digest '{value}': {reason}")]
    MalformedDigest {
        /// The rejected text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The content did not hash to the expected digest.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// The pinned digest.
        expected: Digest,
        /// The digest of the received content.
        actual: Digest,
    },

    /// Reading the source stream failed.
    #[error("failed to read content stream: {0}")]
    Read(#[source] std::io::Error),

    /// Writing the destination failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The file being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Supported digest functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the lower-case name used in configuration and lock files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length in bytes of digests produced by this algorithm.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    pub(crate) fn hasher(self) -> StreamHasher {
        match self {
            Self::Sha256 => StreamHasher::Sha256(Sha256::new()),
            Self::Sha512 => StreamHasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(HashError::UnsupportedAlgorithm {
                name: other.to_owned(),
            }),
        }
    }
}

/// Incremental hasher for one of the supported algorithms.
pub(crate) enum StreamHasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    pub(crate) fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(bytes),
            Self::Sha512(hasher) => hasher.update(bytes),
        }
    }

    pub(crate) fn finish(self) -> Digest {
        match self {
            Self::Sha256(hasher) => Digest::new(HashAlgorithm::Sha256, hasher.finalize().to_vec()),
            Self::Sha512(hasher) => Digest::new(HashAlgorithm::Sha512, hasher.finalize().to_vec()),
        }
    }
}
