//! The download phase: fetch the host's target of each definition and
//! verify it against the pinned digest.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{TargetError, WorkerPool, url_file_name};
use crate::archive::{self, ArchiveFormat, ExtractOptions, ExtractReport};
use crate::definition::{FileDefinition, ResolvedTarget, TargetPlan};
use crate::error::PinfetchError;
use crate::fetch::Fetcher;
use crate::hash::{Digest, verify_to_path};
use crate::lock::{LockError, LockStore};
use crate::platform::HostTarget;

/// Settings for a download run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// The target whose files are fetched.
    pub host: HostTarget,
    /// Directory that relative destinations are resolved against.
    pub base_dir: PathBuf,
    /// Replace existing plain files and extracted entries.
    pub force: bool,
}

/// What happened to one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// A plain file was verified and written.
    Downloaded {
        /// Where the file was written.
        path: PathBuf,
    },
    /// An archive was verified and extracted.
    Extracted {
        /// The extraction root.
        dest: PathBuf,
        /// Per-entry tally.
        report: ExtractReport,
    },
    /// The destination already existed and `force` was not set.
    SkippedExisting {
        /// The existing destination.
        path: PathBuf,
    },
    /// The definition does not cover the host.
    NotApplicable,
}

/// Per-definition results of a download run, in definition order.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Definitions that finished without error.
    pub completed: Vec<(String, FileOutcome)>,
    /// Definitions that failed.
    pub failed: Vec<(String, TargetError)>,
}

impl DownloadReport {
    /// Reports whether every definition finished without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of definitions whose content was written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|outcome| {
            matches!(
                outcome,
                FileOutcome::Downloaded { .. } | FileOutcome::Extracted { .. }
            )
        })
    }

    /// Number of definitions skipped because their destination existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::SkippedExisting { .. }))
    }

    /// Number of definitions that do not cover the host.
    #[must_use]
    pub fn not_applicable(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::NotApplicable))
    }

    /// Converts the report into an error when any definition failed.
    ///
    /// # Errors
    ///
    /// Returns [`PinfetchError::DownloadsFailed`] with the failure count.
    pub fn ensure_success(&self) -> Result<(), PinfetchError> {
        if self.is_success() {
            return Ok(());
        }
        Err(PinfetchError::DownloadsFailed {
            failed: self.failed.len(),
            total: self.failed.len() + self.completed.len(),
        })
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.completed
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

/// Fetches and verifies the host's target of every definition.
///
/// The lock file in `lock_dir` must exist: digests are never learned during
/// this phase. Each definition runs on `pool` independently; a failure is
/// recorded in the report and the other definitions continue.
///
/// Plain files are streamed to a temporary file beside the destination and
/// renamed into place only when the digest matches. Archives are downloaded
/// and verified in a private temporary directory, then extracted into the
/// destination.
///
/// # Errors
///
/// Returns [`LockError::NotFound`] (or another [`LockError`]) when the lock
/// file cannot be loaded. Per-definition failures are reported through
/// [`DownloadReport::failed`] instead.
pub fn download_files(
    definitions: &[FileDefinition],
    lock_dir: &Path,
    fetcher: &dyn Fetcher,
    pool: &WorkerPool,
    options: &DownloadOptions,
) -> Result<DownloadReport, LockError> {
    let store = LockStore::load(lock_dir)?;
    info!(
        "downloading {} file(s) for {} with {} worker(s)",
        definitions.len(),
        options.host,
        pool.workers()
    );

    let outcomes = pool.run_all(definitions, |definition| {
        let outcome = download_one(definition, &store, fetcher, options);
        (definition.id.clone(), outcome)
    });

    let mut report = DownloadReport::default();
    for (file_id, outcome) in outcomes {
        match outcome {
            Ok(done) => report.completed.push((file_id, done)),
            Err(err) => {
                warn!("{file_id}: {err}");
                report.failed.push((file_id, err));
            }
        }
    }
    Ok(report)
}

fn download_one(
    definition: &FileDefinition,
    store: &LockStore,
    fetcher: &dyn Fetcher,
    options: &DownloadOptions,
) -> Result<FileOutcome, TargetError> {
    let Some(plan) = definition.target_for(options.host) else {
        info!("{}: not applicable to {}", definition.id, options.host);
        return Ok(FileOutcome::NotApplicable);
    };
    let target = plan.resolve().map_err(|source| TargetError::Template {
        file_id: definition.id.clone(),
        source,
    })?;
    let expected = store.get_hash(&target.file_id, &target.url)?;
    let dest = destination(&plan, &target, &options.base_dir)?;

    if definition.is_archive {
        fetch_archive(&plan, &target, &expected, fetcher, dest, options.force)
    } else {
        fetch_plain(&target, &expected, fetcher, dest, options.force)
    }
}

fn fetch_plain(
    target: &ResolvedTarget,
    expected: &Digest,
    fetcher: &dyn Fetcher,
    dest: PathBuf,
    force: bool,
) -> Result<FileOutcome, TargetError> {
    if !force && dest.symlink_metadata().is_ok() {
        info!("{}: {} exists; skipping", target.file_id, dest.display());
        return Ok(FileOutcome::SkippedExisting { path: dest });
    }
    fetch_verified(target, expected, fetcher, &dest)?;
    make_executable(&dest);
    info!("{}: wrote {}", target.file_id, dest.display());
    Ok(FileOutcome::Downloaded { path: dest })
}

fn fetch_archive(
    plan: &TargetPlan<'_>,
    target: &ResolvedTarget,
    expected: &Digest,
    fetcher: &dyn Fetcher,
    dest: PathBuf,
    force: bool,
) -> Result<FileOutcome, TargetError> {
    let archive_error = |source| TargetError::Archive {
        file_id: target.file_id.clone(),
        source,
    };
    let name = url_file_name(&target.url).ok_or_else(|| TargetError::NoFileName {
        url: target.url.clone(),
    })?;
    let format = ArchiveFormat::classify(name).map_err(archive_error)?;

    let staging = tempfile::tempdir().map_err(|source| TargetError::Io {
        path: std::env::temp_dir(),
        source,
    })?;
    let archive_path = staging.path().join(name);
    fetch_verified(target, expected, fetcher, &archive_path)?;

    let extract_options = ExtractOptions {
        strip_components: plan.definition().strip_components,
        include: plan.extract_paths().to_vec(),
        overwrite: force,
    };
    let report = archive::extract(format, &archive_path, &dest, &extract_options)
        .map_err(archive_error)?;
    info!(
        "{}: extracted {} entries into {} ({} skipped, {} filtered, {} unsafe)",
        target.file_id,
        report.written,
        dest.display(),
        report.skipped_existing,
        report.filtered,
        report.unsafe_entries.len()
    );
    Ok(FileOutcome::Extracted { dest, report })
}

fn fetch_verified(
    target: &ResolvedTarget,
    expected: &Digest,
    fetcher: &dyn Fetcher,
    path: &Path,
) -> Result<(), TargetError> {
    debug!("{target}: fetching");
    let mut body = fetcher.open(&target.url)?;
    debug!("{target}: verifying against {expected}");
    verify_to_path(&mut body, expected, path)
        .map_err(|err| TargetError::from_hash(&target.url, err))
}

/// Where the target's content goes.
///
/// Explicit destinations are resolved against `base_dir` when relative.
/// Without one, plain files take the URL's file name and archives extract
/// straight into `base_dir`.
fn destination(
    plan: &TargetPlan<'_>,
    target: &ResolvedTarget,
    base_dir: &Path,
) -> Result<PathBuf, TargetError> {
    if let Some(path) = plan.destination() {
        return Ok(base_dir.join(path));
    }
    if plan.definition().is_archive {
        return Ok(base_dir.to_path_buf());
    }
    url_file_name(&target.url)
        .map(|name| base_dir.join(name))
        .ok_or_else(|| TargetError::NoFileName {
            url: target.url.clone(),
        })
}

/// Marks a downloaded file executable. The file is already verified and in
/// place, so a failure here is only reported.
#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        warn!("could not mark {} executable: {err}", path.display());
    }
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{MockFetcher, TransportError};
    use crate::hash::{HashAlgorithm, hash_reader};
    use crate::platform::{Architecture, Platform};
    use rstest::{fixture, rstest};
    use std::io::Cursor;
    use tempfile::TempDir;

    const LINUX_AMD64: HostTarget = HostTarget {
        platform: Platform::Linux,
        arch: Architecture::Amd64,
    };

    fn sha256(content: &[u8]) -> Digest {
        hash_reader(&mut &content[..], HashAlgorithm::Sha256).expect("hash")
    }

    fn serving(url: &'static str, content: &'static [u8]) -> MockFetcher {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_open()
            .withf(move |requested| requested == url)
            .returning(move |_| Ok(Box::new(Cursor::new(content.to_vec()))));
        fetcher
    }

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn pin(&self, file_id: &str, url: &str, content: &[u8]) {
            let store = LockStore::load_or_empty(self.dir.path()).expect("load");
            store.set_hash(file_id, url, sha256(content)).expect("pin");
            store.save(self.dir.path()).expect("save");
        }

        fn options(&self, force: bool) -> DownloadOptions {
            DownloadOptions {
                host: LINUX_AMD64,
                base_dir: self.dir.path().to_path_buf(),
                force,
            }
        }

        fn run(
            &self,
            definitions: &[FileDefinition],
            fetcher: &dyn Fetcher,
            force: bool,
        ) -> DownloadReport {
            download_files(
                definitions,
                self.dir.path(),
                fetcher,
                &WorkerPool::default(),
                &self.options(force),
            )
            .expect("lock file present")
        }
    }

    #[fixture]
    fn workspace() -> Workspace {
        Workspace {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    #[rstest]
    fn writes_verified_plain_files(workspace: Workspace) {
        let url = "https://dl.test/bin/tool";
        workspace.pin("tool", url, b"#!/bin/sh\n");
        let report = workspace.run(
            &[FileDefinition::new("tool", url)],
            &serving(url, b"#!/bin/sh\n"),
            false,
        );

        assert!(report.is_success());
        let written = workspace.dir.path().join("tool");
        assert_eq!(std::fs::read(&written).expect("read"), b"#!/bin/sh\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&written).expect("stat").permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[rstest]
    fn existing_plain_files_are_skipped_without_fetching(workspace: Workspace) {
        let url = "https://dl.test/tool";
        workspace.pin("tool", url, b"new");
        std::fs::write(workspace.dir.path().join("tool"), b"old").expect("seed");

        let mut fetcher = MockFetcher::new();
        fetcher.expect_open().never();
        let report = workspace.run(&[FileDefinition::new("tool", url)], &fetcher, false);

        assert_eq!(report.skipped(), 1);
        assert_eq!(
            std::fs::read(workspace.dir.path().join("tool")).expect("read"),
            b"old"
        );
    }

    #[rstest]
    fn force_replaces_existing_plain_files(workspace: Workspace) {
        let url = "https://dl.test/tool";
        workspace.pin("tool", url, b"new");
        std::fs::write(workspace.dir.path().join("tool"), b"old").expect("seed");

        let report = workspace.run(&[FileDefinition::new("tool", url)], &serving(url, b"new"), true);

        assert_eq!(report.written(), 1);
        assert_eq!(
            std::fs::read(workspace.dir.path().join("tool")).expect("read"),
            b"new"
        );
    }

    #[rstest]
    fn tampered_content_fails_and_leaves_nothing_behind(workspace: Workspace) {
        let url = "https://dl.test/tool";
        workspace.pin("tool", url, b"trusted");

        let report = workspace.run(
            &[FileDefinition::new("tool", url)],
            &serving(url, b"tampered"),
            false,
        );

        assert!(matches!(
            report.ensure_success(),
            Err(PinfetchError::DownloadsFailed { failed: 1, total: 1 })
        ));
        let (file_id, err) = report.failed.first().expect("one failure");
        assert_eq!(file_id, "tool");
        assert!(matches!(err, TargetError::Verify { .. }));
        assert!(!workspace.dir.path().join("tool").exists());
    }

    #[rstest]
    fn failures_do_not_stop_other_files(workspace: Workspace) {
        let good = "https://dl.test/good";
        workspace.pin("good", good, b"good");

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_open()
            .returning(|_| Ok(Box::new(Cursor::new(b"good".to_vec()))));
        let definitions = [
            FileDefinition::new("missing", "https://dl.test/unpinned"),
            FileDefinition::new("good", good),
        ];
        let report = workspace.run(&definitions, &fetcher, false);

        assert_eq!(report.written(), 1);
        let (file_id, err) = report.failed.first().expect("one failure");
        assert_eq!(file_id, "missing");
        assert!(matches!(err, TargetError::Lock(LockError::MissingDigest { .. })));
    }

    #[rstest]
    fn transport_failures_are_reported_per_file(workspace: Workspace) {
        let url = "https://dl.test/tool";
        workspace.pin("tool", url, b"x");
        let mut fetcher = MockFetcher::new();
        fetcher.expect_open().returning(|url| {
            Err(TransportError::Status {
                url: url.to_owned(),
                status: 503,
            })
        });

        let report = workspace.run(&[FileDefinition::new("tool", url)], &fetcher, false);

        assert!(matches!(
            report.failed.first(),
            Some((_, TargetError::Transport(TransportError::Status { status: 503, .. })))
        ));
    }

    #[rstest]
    fn uncovered_hosts_are_not_applicable(workspace: Workspace) {
        workspace.pin("unused", "https://dl.test/unused", b"");
        let mut definition = FileDefinition::new("mac-only", "https://dl.test/{platform}");
        definition
            .platforms
            .insert(Platform::Macos, "darwin".to_owned());
        definition
            .architectures
            .insert(Architecture::Arm64, "arm64".to_owned());

        let mut fetcher = MockFetcher::new();
        fetcher.expect_open().never();
        let report = workspace.run(&[definition], &fetcher, false);

        assert_eq!(report.not_applicable(), 1);
        assert!(report.is_success());
    }

    #[rstest]
    fn explicit_destinations_are_relative_to_the_base_dir(workspace: Workspace) {
        let url = "https://dl.test/tool?raw=1";
        workspace.pin("tool", url, b"x");
        let definition = FileDefinition {
            destination: Some(PathBuf::from("bin/tool")),
            ..FileDefinition::new("tool", url)
        };

        let report = workspace.run(&[definition], &serving(url, b"x"), false);

        assert!(report.is_success());
        assert!(workspace.dir.path().join("bin/tool").is_file());
    }

    #[rstest]
    fn unsupported_archive_formats_fail(workspace: Workspace) {
        let url = "https://dl.test/tool.tar.xz";
        workspace.pin("tool", url, b"x");
        let definition = FileDefinition {
            is_archive: true,
            ..FileDefinition::new("tool", url)
        };
        let mut fetcher = MockFetcher::new();
        fetcher.expect_open().never();

        let report = workspace.run(&[definition], &fetcher, false);

        assert!(matches!(
            report.failed.first(),
            Some((_, TargetError::Archive { .. }))
        ));
    }

    #[test]
    fn a_missing_lock_file_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let fetcher = MockFetcher::new();
        let outcome = download_files(
            &[FileDefinition::new("tool", "https://dl.test/tool")],
            dir.path(),
            &fetcher,
            &WorkerPool::default(),
            &DownloadOptions {
                host: LINUX_AMD64,
                base_dir: dir.path().to_path_buf(),
                force: false,
            },
        );
        assert!(matches!(outcome, Err(LockError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn permission_failures_do_not_fail_a_verified_file() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("vanished");

        make_executable(&missing);

        assert!(!missing.exists());
    }
}
