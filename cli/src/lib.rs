//! Command-line front end for pinfetch.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`logging`] - Log subscriber installation
//! - [`run`] - Subcommand execution and summaries

pub mod cli;
pub mod logging;
pub mod run;
