//! Materialises archive entries below a destination directory.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use tempfile::NamedTempFile;

use super::path::{contained_join, matches_filters, strip_components};
use super::{ArchiveError, ExtractOptions, ExtractReport};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// What to do with the current occupant of an entry's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaf {
    Vacant,
    Replace,
    Keep,
}

/// One extraction run: applies the path rules and the overwrite policy to
/// every entry a format reader hands over.
pub(super) struct Extraction<'a> {
    dest: &'a Path,
    options: &'a ExtractOptions,
    report: ExtractReport,
}

impl<'a> Extraction<'a> {
    pub(super) fn new(dest: &'a Path, options: &'a ExtractOptions) -> Self {
        Self {
            dest,
            options,
            report: ExtractReport::default(),
        }
    }

    pub(super) fn finish(self) -> ExtractReport {
        self.report
    }

    /// Maps a raw entry name onto its on-disk location, or `None` when the
    /// entry is stripped away, filtered out or unsafe.
    pub(super) fn place(&mut self, raw_name: &str) -> Option<PathBuf> {
        let Some(stripped) = strip_components(raw_name, self.options.strip_components) else {
            debug!("skipping '{raw_name}': nothing left after stripping");
            self.report.filtered += 1;
            return None;
        };
        if !matches_filters(&stripped, &self.options.include) {
            debug!("skipping '{raw_name}': not selected by include filters");
            self.report.filtered += 1;
            return None;
        }
        match contained_join(self.dest, &stripped) {
            Ok(path) if self.has_symlinked_ancestor(&path) => {
                error!("skipping '{raw_name}': a parent directory is a symbolic link");
                self.report.unsafe_entries.push(raw_name.to_owned());
                None
            }
            Ok(path) => Some(path),
            Err(err) => {
                error!("skipping potentially unsafe entry: {err}");
                self.report.unsafe_entries.push(raw_name.to_owned());
                None
            }
        }
    }

    pub(super) fn directory(&mut self, path: &Path, mode: Option<u32>) -> Result<(), ArchiveError> {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                if !self.options.overwrite {
                    debug!("directory {} already exists", path.display());
                    self.report.skipped_existing += 1;
                    return Ok(());
                }
                if !meta.is_dir() {
                    return Err(conflict(path, &meta));
                }
                apply_mode(path, dir_mode(mode))?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                create_dir_with_mode(path, dir_mode(mode))?;
            }
            Err(source) => return Err(io_error(path, source)),
        }
        self.report.written += 1;
        Ok(())
    }

    /// Writes a regular file. The content is staged next to `path` and
    /// only renamed into place once it has been read completely.
    pub(super) fn file(
        &mut self,
        path: &Path,
        contents: &mut dyn Read,
        mode: Option<u32>,
    ) -> Result<(), ArchiveError> {
        if self.claim_leaf(path)? == Leaf::Keep {
            return Ok(());
        }
        let parent = path.parent().unwrap_or(self.dest);
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        let mut staging = NamedTempFile::new_in(parent).map_err(|source| io_error(path, source))?;
        io::copy(contents, staging.as_file_mut()).map_err(|source| io_error(path, source))?;
        apply_mode(staging.path(), mode.map_or(DEFAULT_FILE_MODE, permission_bits))?;
        staging
            .persist(path)
            .map_err(|err| io_error(path, err.error))?;
        debug!("extracted {}", path.display());
        self.report.written += 1;
        Ok(())
    }

    #[cfg(unix)]
    pub(super) fn symlink(&mut self, path: &Path, target: &Path) -> Result<(), ArchiveError> {
        match self.claim_leaf(path)? {
            Leaf::Keep => return Ok(()),
            // Removes the link itself when `path` is a symlink; the target is untouched.
            Leaf::Replace => fs::remove_file(path).map_err(|source| io_error(path, source))?,
            Leaf::Vacant => {}
        }
        let parent = path.parent().unwrap_or(self.dest);
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        std::os::unix::fs::symlink(target, path).map_err(|source| io_error(path, source))?;
        debug!("linked {} -> {}", path.display(), target.display());
        self.report.written += 1;
        Ok(())
    }

    #[cfg(not(unix))]
    pub(super) fn symlink(&mut self, path: &Path, target: &Path) -> Result<(), ArchiveError> {
        let name = format!("{} -> {}", path.display(), target.display());
        self.unsupported(&name, "symbolic link");
        Ok(())
    }

    pub(super) fn unsupported(&mut self, raw_name: &str, kind: &str) {
        warn!("skipping '{raw_name}': unsupported entry type {kind}");
        self.report.unsupported += 1;
    }

    /// Rejects an entry whose name cannot be represented on disk.
    pub(super) fn reject(&mut self, raw_name: &str, reason: &str) {
        error!("skipping '{raw_name}': {reason}");
        self.report.unsafe_entries.push(raw_name.to_owned());
    }

    /// Decides what happens to an existing path before a file or link is
    /// written there.
    fn claim_leaf(&mut self, path: &Path) -> Result<Leaf, ArchiveError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Leaf::Vacant),
            Err(source) => return Err(io_error(path, source)),
        };
        if !self.options.overwrite {
            warn!(
                "skipping {}: destination already exists (overwrite disabled)",
                path.display()
            );
            self.report.skipped_existing += 1;
            return Ok(Leaf::Keep);
        }
        if meta.is_dir() {
            return Err(conflict(path, &meta));
        }
        Ok(Leaf::Replace)
    }

    /// Reports whether an existing directory between the destination root and
    /// `path` is a symbolic link, which would let a later entry escape.
    fn has_symlinked_ancestor(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(self.dest) else {
            return true;
        };
        let mut current = self.dest.to_path_buf();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }
}

fn conflict(path: &Path, existing: &fs::Metadata) -> ArchiveError {
    let kind = if existing.is_dir() {
        "directory"
    } else if existing.file_type().is_symlink() {
        "symbolic link"
    } else {
        "file"
    };
    ArchiveError::DestinationConflict {
        path: path.to_path_buf(),
        existing: kind,
    }
}

fn io_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

const fn permission_bits(mode: u32) -> u32 {
    mode & 0o777
}

/// Owner keeps rwx so later entries can be written below the directory.
const fn dir_mode(mode: Option<u32>) -> u32 {
    match mode {
        Some(recorded) => permission_bits(recorded) | 0o700,
        None => DEFAULT_DIR_MODE,
    }
}

#[cfg(unix)]
fn create_dir_with_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .map_err(|source| io_error(path, source))?;
    apply_mode(path, mode)
}

#[cfg(not(unix))]
fn create_dir_with_mode(path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|source| io_error(path, source))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    Ok(())
}
