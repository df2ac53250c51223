//! Safe archive extraction.
//!
//! Supports gzip-compressed tarballs and zip files. Every entry passes
//! through the same pipeline regardless of format: leading components are
//! stripped, include filters applied, and the resulting path checked for
//! containment in the destination before anything touches the disk. Entries
//! that would escape are logged and skipped; extraction carries on with the
//! rest of the archive.

mod path;
mod tar_gz;
mod writer;
mod zip_archive;

use std::fmt;
use std::path::{Path, PathBuf};

use log::info;

pub use path::{contained_join, matches_filters, strip_components};

use writer::Extraction;

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The file name does not map to a supported archive format.
    #[error("unsupported archive format for '{name}' (expected .tar.gz, .tgz or .zip)")]
    UnsupportedFormat {
        /// The classified file name.
        name: String,
    },

    /// An entry would resolve outside the destination directory.
    #[error("entry '{entry}' escapes the destination directory")]
    UnsafePath {
        /// The offending entry name.
        entry: String,
    },

    /// An existing path has a type that the entry cannot replace.
    #[error("cannot replace existing {existing} at {path}")]
    DestinationConflict {
        /// The conflicting path.
        path: PathBuf,
        /// What currently occupies the path.
        existing: &'static str,
    },

    /// Reading the archive or writing an entry failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The archive or destination path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The zip container could not be read.
    #[error("invalid zip archive {path}: {source}")]
    Zip {
        /// The archive path.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
}

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A tar stream compressed with gzip (`.tar.gz`, `.tgz`).
    TarGzip,
    /// A zip file (`.zip`).
    Zip,
}

impl ArchiveFormat {
    /// Selects the format from a file name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UnsupportedFormat`] for any other extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use pinfetch::archive::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::classify("tool.TGZ")?, ArchiveFormat::TarGzip);
    /// assert!(ArchiveFormat::classify("tool.tar.xz").is_err());
    /// # Ok::<(), pinfetch::archive::ArchiveError>(())
    /// ```
    pub fn classify(name: &str) -> Result<Self, ArchiveError> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(Self::TarGzip)
        } else if lower.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(ArchiveError::UnsupportedFormat {
                name: name.to_owned(),
            })
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TarGzip => "tar.gz",
            Self::Zip => "zip",
        })
    }
}

/// How entries are selected and placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Number of leading path segments removed from every entry.
    pub strip_components: usize,
    /// When non-empty, only entries equal to or below one of these paths
    /// (after stripping) are extracted.
    pub include: Vec<String>,
    /// Replace files and links that already exist.
    pub overwrite: bool,
}

/// Tally of what happened to each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Entries created or replaced.
    pub written: usize,
    /// Entries kept as they were because the path already existed.
    pub skipped_existing: usize,
    /// Entries dropped by stripping or include filters.
    pub filtered: usize,
    /// Entries of a type that is not materialised.
    pub unsupported: usize,
    /// Names of entries rejected for escaping the destination.
    pub unsafe_entries: Vec<String>,
}

/// Extracts `archive` into `dest`.
///
/// # Errors
///
/// Returns [`ArchiveError::DestinationConflict`] when an entry collides with
/// an existing path of another type, [`ArchiveError::Zip`] for unreadable zip
/// files and [`ArchiveError::Io`] for any other I/O failure. Unsafe entries
/// are not errors; they are listed in the report.
pub fn extract(
    format: ArchiveFormat,
    archive: &Path,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport, ArchiveError> {
    info!(
        "extracting {} archive {} into {} (strip={}, overwrite={})",
        format,
        archive.display(),
        dest.display(),
        options.strip_components,
        options.overwrite
    );
    std::fs::create_dir_all(dest).map_err(|source| ArchiveError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut extraction = Extraction::new(dest, options);
    match format {
        ArchiveFormat::TarGzip => tar_gz::extract(archive, &mut extraction)?,
        ArchiveFormat::Zip => zip_archive::extract(archive, &mut extraction)?,
    }
    Ok(extraction.finish())
}
