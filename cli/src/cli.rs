//! CLI argument definitions for pinfetch.
//!
//! Kept apart from the entrypoint so that parsing can be tested without
//! running any phase.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use pinfetch::config::CONFIG_FILE_NAME;

/// Pin and fetch external files by digest.
#[derive(Parser, Debug, Clone)]
#[command(name = "pinfetch")]
#[command(version, about)]
#[command(long_about = concat!(
    "Pin and fetch external files by digest.\n\n",
    "pinfetch reads file definitions from pinfetch.toml, expands each URL ",
    "template for every declared platform and architecture, and records the ",
    "digest of what each URL serves the first time it is seen. Later runs ",
    "reject content that no longer matches its pin.\n\n",
    "`pinfetch lock` fetches every target and updates pinfetch.lock. ",
    "`pinfetch download` fetches the current host's target of each file, ",
    "verifies it against the lock file while writing, and extracts archives.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Record digests for every target:\n",
    "    $ pinfetch lock\n\n",
    "  Fetch files for this machine, replacing existing ones:\n",
    "    $ pinfetch download --force\n\n",
    "  Use another configuration file and four workers:\n",
    "    $ pinfetch -c tools/pinfetch.toml -j 4 lock\n\n",
    "ENVIRONMENT:\n",
    "  RUST_LOG    Log filter directives; overrides --log-level",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file; the lock file is kept beside it.
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        default_value = CONFIG_FILE_NAME
    )]
    pub config: Utf8PathBuf,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: LevelFilter,

    /// Number of parallel workers [default: available CPUs].
    #[arg(short, long, global = true, value_name = "N")]
    pub jobs: Option<usize>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch every target and pin its digest in the lock file.
    Lock,

    /// Fetch and verify this host's files against the lock file.
    Download(DownloadArgs),
}

/// Arguments for the download command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadArgs {
    /// Replace existing files and extracted entries.
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
