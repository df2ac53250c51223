//! Streaming hash and verify-while-writing.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

use super::{Digest, HashAlgorithm, HashError, StreamHasher};

const CHUNK_SIZE: usize = 64 * 1024;

/// Computes the digest of everything `reader` yields.
///
/// # Errors
///
/// Returns [`HashError::Read`] when the stream fails.
///
/// # Examples
///
/// ```
/// use pinfetch::hash::{HashAlgorithm, hash_reader};
///
/// let digest = hash_reader(&mut &b"abc"[..], HashAlgorithm::Sha256)?;
/// assert_eq!(
///     digest.to_hex(),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// # Ok::<(), pinfetch::hash::HashError>(())
/// ```
pub fn hash_reader<R: Read + ?Sized>(
    reader: &mut R,
    algorithm: HashAlgorithm,
) -> Result<Digest, HashError> {
    let mut hasher = algorithm.hasher();
    pump(reader, &mut hasher, &mut io::sink(), Path::new(""))?;
    Ok(hasher.finish())
}

/// Computes the digest of a local file.
///
/// # Errors
///
/// Returns [`HashError::Read`] when the file cannot be opened or read.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<Digest, HashError> {
    let mut file = File::open(path).map_err(HashError::Read)?;
    hash_reader(&mut file, algorithm)
}

/// Streams `reader` into `dest`, verifying the content against `expected`.
///
/// The bytes go to a temporary file in the same directory as `dest`. Only
/// when the digest matches is the temporary file renamed onto `dest`; on a
/// mismatch or any I/O failure the temporary file is removed and `dest` is
/// left as it was.
///
/// # Errors
///
/// Returns [`HashError::Mismatch`] when the content differs from the pin,
/// [`HashError::Read`] when the source fails, and [`HashError::Write`] when
/// the destination cannot be written.
pub fn verify_to_path<R: Read + ?Sized>(
    reader: &mut R,
    expected: &Digest,
    dest: &Path,
) -> Result<(), HashError> {
    let write_err = |source: io::Error| HashError::Write {
        path: dest.to_path_buf(),
        source,
    };
    let parent = dest
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut staging = NamedTempFile::new_in(parent).map_err(write_err)?;
    let mut hasher = expected.algorithm().hasher();
    pump(reader, &mut hasher, staging.as_file_mut(), dest)?;
    staging.as_file_mut().sync_all().map_err(write_err)?;

    let actual = hasher.finish();
    if &actual != expected {
        // Dropping `staging` removes the temporary file.
        return Err(HashError::Mismatch {
            expected: expected.clone(),
            actual,
        });
    }

    staging.persist(dest).map_err(|err| write_err(err.error))?;
    debug!("verified {} ({expected})", dest.display());
    Ok(())
}

/// Copies `reader` into `writer`, feeding every chunk to `hasher`.
fn pump<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    hasher: &mut StreamHasher,
    writer: &mut W,
    dest: &Path,
) -> Result<(), HashError> {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(HashError::Read(err)),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        hasher.update(chunk);
        writer.write_all(chunk).map_err(|source| HashError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    writer.flush().map_err(|source| HashError::Write {
        path: dest.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn digest_of(bytes: &[u8]) -> Digest {
        hash_reader(&mut Cursor::new(bytes), HashAlgorithm::Sha256).expect("hash")
    }

    fn leftover_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn hashes_known_vector() {
        assert_eq!(digest_of(b"abc").to_hex(), ABC_SHA256);
    }

    #[test]
    fn sha512_of_empty_input() {
        let digest = hash_reader(&mut io::empty(), HashAlgorithm::Sha512).expect("hash");
        assert!(digest.to_hex().starts_with("cf83e1357eefb8bd"));
    }

    #[test]
    fn hash_file_matches_hash_reader() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("payload");
        std::fs::write(&path, b"abc").expect("write");
        let digest = hash_file(&path, HashAlgorithm::Sha256).expect("hash");
        assert_eq!(digest, digest_of(b"abc"));
    }

    #[test]
    fn verified_content_lands_at_destination() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("nested").join("tool");
        verify_to_path(&mut Cursor::new(b"abc"), &digest_of(b"abc"), &dest).expect("verify");

        assert_eq!(std::fs::read(&dest).expect("read"), b"abc");
        assert_eq!(leftover_entries(&dir.path().join("nested")), vec!["tool"]);
    }

    #[test]
    fn mismatch_leaves_no_file_behind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("tool");
        let err = verify_to_path(&mut Cursor::new(b"tampered"), &digest_of(b"abc"), &dest)
            .expect_err("mismatch");

        assert!(matches!(err, HashError::Mismatch { .. }));
        assert!(!dest.exists());
        assert!(leftover_entries(dir.path()).is_empty());
    }

    #[test]
    fn mismatch_keeps_previous_file_intact() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("tool");
        std::fs::write(&dest, b"old").expect("seed");
        let result = verify_to_path(&mut Cursor::new(b"tampered"), &digest_of(b"abc"), &dest);

        assert!(result.is_err());
        assert_eq!(std::fs::read(&dest).expect("read"), b"old");
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn read_failure_cleans_up() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("tool");
        let err = verify_to_path(&mut FailingReader, &digest_of(b"abc"), &dest)
            .expect_err("read failure");

        assert!(matches!(err, HashError::Read(_)));
        assert!(leftover_entries(dir.path()).is_empty());
    }
}
