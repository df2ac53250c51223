//! Log output for the pinfetch binary.
//!
//! The library reports progress through the `log` facade. This module installs
//! a `tracing-subscriber` formatter on stderr; its log bridge forwards those
//! records. `RUST_LOG` directives take precedence over `--log-level`.

use log::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber.
///
/// Only the first call in a process has any effect.
pub fn init_logging(level: LevelFilter) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
    if installed.is_err() {
        // A subscriber is already installed; keep it.
    }
}

/// The filter directive equivalent to `level`.
fn directive(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LevelFilter::Off, "off")]
    #[case(LevelFilter::Info, "info")]
    #[case(LevelFilter::Trace, "trace")]
    fn directive_uses_lowercase_level_names(#[case] level: LevelFilter, #[case] expected: &str) {
        assert_eq!(directive(level), expected);
    }

    #[test]
    fn init_logging_tolerates_repeated_calls() {
        init_logging(LevelFilter::Warn);
        init_logging(LevelFilter::Debug);
    }
}
