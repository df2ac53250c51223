//! The lock phase: pin a digest for every target of every definition.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{Cancellation, TargetError, WorkerPool};
use crate::definition::{FileDefinition, ResolvedTarget, TargetPlan};
use crate::fetch::Fetcher;
use crate::hash::{Digest, hash_reader};
use crate::lock::{ActiveSet, LockStore, lock_path};

/// Result of a successful lock phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOutcome {
    /// Every resolved target with the digest now pinned for it, in
    /// definition then platform then architecture order.
    pub pinned: Vec<(ResolvedTarget, Digest)>,
    /// Whether the lock file was written.
    pub changed: bool,
    /// Location of the lock file.
    pub lock_path: PathBuf,
}

/// Pins a digest for every target of `definitions`.
///
/// The lock file in `lock_dir` is loaded first (a missing file starts an
/// empty store) so that already-pinned targets are checked against their
/// recorded digests. Targets run on `pool`; the first failure cancels the
/// rest and is returned without touching the lock file. On success, pins for
/// targets that no longer exist are pruned and the file is written only if it
/// was absent or its content changed.
///
/// # Errors
///
/// Returns the first [`TargetError`] raised by any target, or a
/// [`TargetError::Lock`] when the lock file cannot be read or written. A
/// digest that differs from the pinned one surfaces as
/// [`crate::lock::LockError::HashInconsistency`].
pub fn lock_files(
    definitions: &[FileDefinition],
    lock_dir: &Path,
    fetcher: &dyn Fetcher,
    pool: &WorkerPool,
) -> Result<LockOutcome, TargetError> {
    let existed = lock_path(lock_dir).exists();
    let store = LockStore::load_or_empty(lock_dir)?;
    let before = store.snapshot();
    let plans: Vec<TargetPlan<'_>> = definitions
        .iter()
        .flat_map(FileDefinition::targets)
        .collect();
    info!(
        "locking {} target(s) across {} file(s) with {} worker(s)",
        plans.len(),
        definitions.len(),
        pool.workers()
    );

    let pinned = pool.try_run(&plans, |plan, cancellation| {
        lock_target(plan, &store, fetcher, cancellation)
    })?;

    let active: ActiveSet = pinned.iter().map(|(target, _)| target).collect();
    store.prune(&active);

    let changed = !existed || store.snapshot() != before;
    if changed {
        let path = store.save(lock_dir)?;
        info!("updated {} ({} pin(s))", path.display(), store.len());
    } else {
        info!("lock file already up to date");
    }

    Ok(LockOutcome {
        pinned,
        changed,
        lock_path: lock_path(lock_dir),
    })
}

fn lock_target(
    plan: &TargetPlan<'_>,
    store: &LockStore,
    fetcher: &dyn Fetcher,
    cancellation: &Cancellation,
) -> Result<(ResolvedTarget, Digest), TargetError> {
    let target = plan.resolve().map_err(|source| TargetError::Template {
        file_id: plan.file_id().to_owned(),
        source,
    })?;
    debug!("{target}: resolved");

    if cancellation.is_cancelled() {
        return Err(TargetError::Cancelled);
    }

    debug!("{target}: fetching");
    let mut body = fetcher.open(&target.url)?;

    debug!("{target}: hashing");
    let digest = hash_reader(&mut body, plan.hash_algorithm())
        .map_err(|err| TargetError::from_hash(&target.url, err))?;

    store.set_hash(&target.file_id, &target.url, digest.clone())?;
    info!("{target}: {digest}");
    Ok((target, digest))
}
