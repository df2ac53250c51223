//! Persisted trust-on-first-use digest pins.
//!
//! The lock store maps `(file id, resolved URL)` to the digest observed the
//! first time that URL was fetched. Once a key is pinned, any later write for
//! the same key must carry an identical digest. The store lives in
//! `pinfetch.lock` next to the configuration file:
//!
//! ```json
//! {
//!   "version": 1,
//!   "files": {
//!     "ripgrep": {
//!       "https://example.com/rg-linux.tar.gz": "sha256:…"
//!     }
//!   }
//! }
//! ```
//!
//! Writes go through a temporary file in the same directory followed by a
//! rename, so a crash never leaves a truncated lock file behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::definition::ResolvedTarget;
use crate::hash::Digest;

/// File name of the lock store inside its directory.
pub const LOCK_FILE_NAME: &str = "pinfetch.lock";

/// The only lock file format version this build reads and writes.
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// Permission bits of a saved lock file on Unix.
#[cfg(unix)]
pub const LOCK_FILE_MODE: u32 = 0o644;

/// `file id → resolved URL → pinned digest`.
pub type LockEntries = BTreeMap<String, BTreeMap<String, Digest>>;

/// Errors raised by the lock store.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// No lock file exists at the expected location.
    #[error("lock file not found at {path}; run `pinfetch lock` first")]
    NotFound {
        /// Where the lock file was expected.
        path: PathBuf,
    },

    /// The lock file exists but cannot be parsed.
    #[error("lock file {path} is corrupt: {reason}")]
    Corrupt {
        /// The lock file path.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// The lock file declares a format version this build does not know.
    #[error("lock file {path} has unsupported version {found} (supported: {LOCK_FORMAT_VERSION})")]
    UnsupportedVersion {
        /// The lock file path.
        path: PathBuf,
        /// The declared version.
        found: u32,
    },

    /// Reading the lock file failed.
    #[error("failed to read lock file {path}: {source}")]
    Read {
        /// The lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the lock file failed.
    #[error("failed to write lock file {path}: {source}")]
    Write {
        /// The lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A different digest is already pinned for this key.
    #[error(
        "hash inconsistency for '{file_id}' at {url}: pinned {pinned}, observed {observed}; \
         upstream content changed"
    )]
    HashInconsistency {
        /// The file identifier.
        file_id: String,
        /// The resolved URL.
        url: String,
        /// The digest recorded in the lock store.
        pinned: Digest,
        /// The digest that was just computed.
        observed: Digest,
    },

    /// No digest is pinned for this key.
    #[error("no pinned digest for '{file_id}' at {url}; run `pinfetch lock` to record it")]
    MissingDigest {
        /// The file identifier.
        file_id: String,
        /// The resolved URL.
        url: String,
    },
}

#[derive(Serialize, Deserialize)]
struct LockDocument {
    version: u32,
    #[serde(default)]
    files: LockEntries,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Returns the lock file path inside `dir`.
#[must_use]
pub fn lock_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE_NAME)
}

/// In-memory lock store shared by the workers of a run.
///
/// Reads take a shared lock and mutations an exclusive one, so the store can
/// be handed to worker threads by reference.
#[derive(Debug, Default)]
pub struct LockStore {
    entries: RwLock<LockEntries>,
}

impl LockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from existing entries.
    #[must_use]
    pub const fn from_entries(entries: LockEntries) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Loads the lock file from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotFound`] when the file is absent,
    /// [`LockError::Corrupt`] or [`LockError::UnsupportedVersion`] when it
    /// cannot be trusted, and [`LockError::Read`] for other I/O failures.
    pub fn load(dir: &Path) -> Result<Self, LockError> {
        let path = lock_path(dir);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockError::NotFound { path });
            }
            Err(source) => return Err(LockError::Read { path, source }),
        };

        let corrupt = |err: serde_json::Error| LockError::Corrupt {
            path: path.clone(),
            reason: err.to_string(),
        };
        let probe: VersionProbe = serde_json::from_str(&text).map_err(corrupt)?;
        if probe.version != LOCK_FORMAT_VERSION {
            return Err(LockError::UnsupportedVersion {
                path: path.clone(),
                found: probe.version,
            });
        }
        let document: LockDocument = serde_json::from_str(&text).map_err(corrupt)?;
        debug!(
            "loaded {} pinned file(s) from {}",
            document.files.len(),
            path.display()
        );
        Ok(Self::from_entries(document.files))
    }

    /// Loads the lock file from `dir`, starting empty when none exists.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`] except that a missing file is not an error.
    pub fn load_or_empty(dir: &Path) -> Result<Self, LockError> {
        match Self::load(dir) {
            Err(LockError::NotFound { path }) => {
                debug!("no lock file at {}; starting empty", path.display());
                Ok(Self::new())
            }
            other => other,
        }
    }

    /// Returns the digest pinned for `(file_id, url)`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::MissingDigest`] when the key has no pin.
    pub fn get_hash(&self, file_id: &str, url: &str) -> Result<Digest, LockError> {
        self.read()
            .get(file_id)
            .and_then(|urls| urls.get(url))
            .cloned()
            .ok_or_else(|| LockError::MissingDigest {
                file_id: file_id.to_owned(),
                url: url.to_owned(),
            })
    }

    /// Pins `digest` for `(file_id, url)`.
    ///
    /// Writing the digest that is already pinned is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::HashInconsistency`] when a different digest is
    /// already pinned; the store is left unchanged.
    pub fn set_hash(&self, file_id: &str, url: &str, digest: Digest) -> Result<(), LockError> {
        let mut entries = self.write();
        if let Some(pinned) = entries.get(file_id).and_then(|urls| urls.get(url)) {
            if *pinned == digest {
                return Ok(());
            }
            return Err(LockError::HashInconsistency {
                file_id: file_id.to_owned(),
                url: url.to_owned(),
                pinned: pinned.clone(),
                observed: digest,
            });
        }
        debug!("pinning {file_id} {url} -> {digest}");
        entries
            .entry(file_id.to_owned())
            .or_default()
            .insert(url.to_owned(), digest);
        Ok(())
    }

    /// Drops every pin that is not in `active`, and every file id left
    /// without pins.
    pub fn prune(&self, active: &ActiveSet) {
        let mut entries = self.write();
        entries.retain(|file_id, urls| {
            urls.retain(|url, _| {
                let keep = active.contains(file_id, url);
                if !keep {
                    debug!("pruning stale pin {file_id} {url}");
                }
                keep
            });
            !urls.is_empty()
        });
    }

    /// Atomically writes the store to `dir` and returns the file path.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Write`] when the temporary file cannot be created,
    /// written or renamed into place.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, LockError> {
        let path = lock_path(dir);
        let write_err = |source: std::io::Error| LockError::Write {
            path: path.clone(),
            source,
        };
        let document = LockDocument {
            version: LOCK_FORMAT_VERSION,
            files: self.snapshot(),
        };
        let mut json = serde_json::to_string_pretty(&document)
            .map_err(|err| write_err(std::io::Error::other(err)))?;
        json.push('\n');

        let mut staging = NamedTempFile::new_in(dir).map_err(write_err)?;
        staging.write_all(json.as_bytes()).map_err(write_err)?;
        make_shareable(staging.as_file()).map_err(write_err)?;
        staging.as_file().sync_all().map_err(write_err)?;
        staging.persist(&path).map_err(|err| write_err(err.error))?;
        debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Returns a copy of the current entries.
    #[must_use]
    pub fn snapshot(&self) -> LockEntries {
        self.read().clone()
    }

    /// Number of pinned `(file id, URL)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    /// Reports whether nothing is pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LockEntries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LockEntries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens the lock file to other readers; staging files start owner-only.
#[cfg(unix)]
fn make_shareable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(LOCK_FILE_MODE))
}

#[cfg(not(unix))]
fn make_shareable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

/// The `(file id, URL)` pairs produced by the current resolution.
///
/// Used only to prune the lock store; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    urls: BTreeMap<String, BTreeSet<String>>,
}

impl ActiveSet {
    /// Records `(file_id, url)` as active.
    pub fn insert(&mut self, file_id: &str, url: &str) {
        self.urls
            .entry(file_id.to_owned())
            .or_default()
            .insert(url.to_owned());
    }

    /// Reports whether `(file_id, url)` is active.
    #[must_use]
    pub fn contains(&self, file_id: &str, url: &str) -> bool {
        self.urls
            .get(file_id)
            .is_some_and(|urls| urls.contains(url))
    }

    /// Number of active pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.values().map(BTreeSet::len).sum()
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl<'a> FromIterator<&'a ResolvedTarget> for ActiveSet {
    fn from_iter<I: IntoIterator<Item = &'a ResolvedTarget>>(targets: I) -> Self {
        let mut active = Self::default();
        for target in targets {
            active.insert(&target.file_id, &target.url);
        }
        active
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
