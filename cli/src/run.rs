//! Subcommand execution and user-facing summaries.
//!
//! Progress detail goes through the log facade; the short summaries written
//! here are always shown, even with logging turned off.

use std::io::Write;

use pinfetch::config::Config;
use pinfetch::coordinator::{
    DownloadOptions, DownloadReport, WorkerPool, download_files, lock_files,
};
use pinfetch::error::Result;
use pinfetch::fetch::Fetcher;
use pinfetch::platform::HostTarget;

use crate::cli::{Cli, Command};

/// Runs the selected subcommand with `fetcher` as the transport.
///
/// # Errors
///
/// Returns the configuration, lock or target error that ended the run, or
/// [`pinfetch::PinfetchError::DownloadsFailed`] after a download run in which
/// any file failed.
pub fn run(cli: &Cli, fetcher: &dyn Fetcher, stderr: &mut dyn Write) -> Result<()> {
    let config = Config::load(cli.config.as_std_path())?;
    let pool = WorkerPool::with_jobs(cli.jobs);
    match &cli.command {
        Command::Lock => run_lock(&config, fetcher, &pool, stderr),
        Command::Download(args) => run_download(&config, fetcher, &pool, args.force, stderr),
    }
}

fn run_lock(
    config: &Config,
    fetcher: &dyn Fetcher,
    pool: &WorkerPool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let outcome = lock_files(&config.files, config.base_dir(), fetcher, pool)?;
    let message = if outcome.changed {
        format!(
            "Pinned {} target(s) in {}.",
            outcome.pinned.len(),
            outcome.lock_path.display()
        )
    } else {
        format!(
            "{} is up to date ({} target(s)).",
            outcome.lock_path.display(),
            outcome.pinned.len()
        )
    };
    write_stderr_line(stderr, message);
    Ok(())
}

fn run_download(
    config: &Config,
    fetcher: &dyn Fetcher,
    pool: &WorkerPool,
    force: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let options = DownloadOptions {
        host: HostTarget::current()?,
        base_dir: config.base_dir().to_path_buf(),
        force,
    };
    let report = download_files(&config.files, config.base_dir(), fetcher, pool, &options)?;
    write_stderr_line(stderr, download_summary(&report));
    for (file_id, err) in &report.failed {
        write_stderr_line(stderr, format!("  {file_id}: {err}"));
    }
    report.ensure_success()
}

/// One-line tally of a download run.
#[must_use]
pub fn download_summary(report: &DownloadReport) -> String {
    format!(
        "Downloaded {}, skipped {} existing, {} not applicable, {} failed.",
        report.written(),
        report.skipped(),
        report.not_applicable(),
        report.failed.len()
    )
}

/// Maps a run result to a process exit code, printing any error.
#[must_use]
pub fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

/// Writes one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}
