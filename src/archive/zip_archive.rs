//! Zip reader.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::ArchiveError;
use super::writer::Extraction;

const FILE_TYPE_MASK: u32 = 0o170_000;
const SYMLINK_TYPE: u32 = 0o120_000;

pub(super) fn extract(archive: &Path, extraction: &mut Extraction<'_>) -> Result<(), ArchiveError> {
    let zip_err = |source: zip::result::ZipError| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(|source| ArchiveError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut container = zip::ZipArchive::new(file).map_err(zip_err)?;

    for index in 0..container.len() {
        let mut entry = container.by_index(index).map_err(zip_err)?;
        let name = entry.name().to_owned();
        let Some(target) = extraction.place(&name) else {
            continue;
        };
        let mode = entry.unix_mode();
        if entry.is_dir() {
            extraction.directory(&target, mode)?;
        } else if mode.is_some_and(|bits| bits & FILE_TYPE_MASK == SYMLINK_TYPE) {
            let mut link = String::new();
            entry
                .read_to_string(&mut link)
                .map_err(|source| ArchiveError::Io {
                    path: archive.to_path_buf(),
                    source,
                })?;
            extraction.symlink(&target, &PathBuf::from(link))?;
        } else {
            extraction.file(&target, &mut entry, mode)?;
        }
    }
    Ok(())
}
