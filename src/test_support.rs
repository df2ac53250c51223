//! Test doubles for exercising pinfetch without a network.
//!
//! Enabled by the `test-support` feature. Not covered by semver guarantees.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::sync::{Mutex, PoisonError};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::fetch::{Body, Fetcher, TransportError};

/// In-memory [`Fetcher`] serving fixed bodies by URL.
///
/// Unknown URLs answer with HTTP 404. Every request is recorded so tests can
/// assert what was (or was not) fetched.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use pinfetch::fetch::Fetcher;
/// use pinfetch::test_support::StaticFetcher;
///
/// let fetcher = StaticFetcher::new().with("https://dl.test/a", b"alpha");
/// let mut body = String::new();
/// fetcher.open("https://dl.test/a")?.read_to_string(&mut body)?;
/// assert_eq!(body, "alpha");
/// assert!(fetcher.open("https://dl.test/b").is_err());
/// assert_eq!(fetcher.request_count(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct StaticFetcher {
    bodies: Mutex<BTreeMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// Creates a fetcher that serves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body for `url`.
    #[must_use]
    pub fn with(self, url: &str, body: &[u8]) -> Self {
        self.serve(url, body);
        self
    }

    /// Sets or replaces the body served for `url`.
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_owned(), body.to_vec());
    }

    /// URLs requested so far, in request order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests made so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Fetcher for StaticFetcher {
    fn open(&self, url: &str) -> Result<Body, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_owned());
        let body = self
            .bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();
        match body {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(TransportError::Status {
                url: url.to_owned(),
                status: 404,
            }),
        }
    }
}

/// Builds a gzip-compressed tarball of regular files.
///
/// # Errors
///
/// Returns any I/O error raised while encoding.
pub fn tar_gz(files: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, *content)?;
    }
    builder.into_inner()?.finish()
}

/// Builds a zip archive of regular files.
///
/// # Errors
///
/// Returns any I/O error raised while encoding.
pub fn zip(files: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, content) in files {
        writer.start_file(*name, options).map_err(io::Error::other)?;
        writer.write_all(content)?;
    }
    let cursor = writer.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}
