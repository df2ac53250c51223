//! Gzip-compressed tarball reader.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::EntryType;

use super::ArchiveError;
use super::writer::Extraction;

pub(super) fn extract(archive: &Path, extraction: &mut Extraction<'_>) -> Result<(), ArchiveError> {
    let read_err = |source: std::io::Error| ArchiveError::Io {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(read_err)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));

    for item in tarball.entries().map_err(read_err)? {
        let mut entry = item.map_err(read_err)?;
        let raw_name = entry.path_bytes().into_owned();
        let Ok(name) = String::from_utf8(raw_name) else {
            let shown = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            extraction.reject(&shown, "entry name is not valid UTF-8");
            continue;
        };
        let Some(target) = extraction.place(&name) else {
            continue;
        };
        let mode = entry.header().mode().ok();
        let kind = entry.header().entry_type();
        match kind {
            EntryType::Directory => extraction.directory(&target, mode)?,
            EntryType::Regular | EntryType::Continuous => {
                extraction.file(&target, &mut entry, mode)?;
            }
            EntryType::Symlink => match entry.link_name().map_err(read_err)? {
                Some(link) => extraction.symlink(&target, &link)?,
                None => extraction.unsupported(&name, "symbolic link without target"),
            },
            other => extraction.unsupported(&name, &format!("{other:?}")),
        }
    }
    Ok(())
}
