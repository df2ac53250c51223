//! Trust-on-first-use pinning for externally fetched files.
//!
//! pinfetch reads a list of file definitions, expands each URL template for
//! every declared platform and architecture, and records the digest of what
//! each URL served the first time it was seen. Later runs reject any content
//! that no longer matches its pin. Downloads are verified while they are
//! written and only appear at their destination once the digest matches;
//! archives are then extracted with path-traversal protection.
//!
//! # Modules
//!
//! - [`archive`] - Safe tar.gz and zip extraction
//! - [`config`] - `pinfetch.toml` loading and validation
//! - [`coordinator`] - Bounded-parallel lock and download phases
//! - [`definition`] - File definitions and per-target plans
//! - [`error`] - Run-level error type
//! - [`fetch`] - HTTP retrieval behind a mockable trait
//! - [`hash`] - Digests, streaming hashing and verify-while-writing
//! - [`lock`] - The persisted digest store
//! - [`platform`] - Platform and architecture identifiers
//! - [`template`] - URL template expansion

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod lock;
pub mod platform;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::Config;
pub use coordinator::{
    DownloadOptions, DownloadReport, LockOutcome, WorkerPool, download_files, lock_files,
};
pub use error::{PinfetchError, Result};
