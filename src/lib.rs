#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! apkharvest - a version-tracked mirror of decompiled Android packages
//!
//! This library discovers packages published by a set of tracked developers
//! on a third-party distribution site, downloads the ones whose published
//! version changed since the last run, and converts each downloaded artifact
//! into a readable source tree with the external jadx decompiler.
//!
//! ## Usage
//! ```rust,ignore
//! use apkharvest::{Config, Pipeline};
//!
//! async fn example() -> apkharvest::Result<()> {
//!     let config = Config::default();
//!     let developers = config.developers.clone();
//!     let pipeline = Pipeline::new(config, false, 8)?;
//!     let entries = pipeline.discover(&developers).await;
//!     let summary = pipeline.run(&entries).await;
//!     assert!(!summary.has_failures());
//!     Ok(())
//! }
//! ```

/// Configuration for the tracked developers, data layout, and tool paths
pub mod config;
/// Supervised invocation of the external decompiler with progress monitoring
pub mod decompile;
/// Expected-class-count estimation from APK/XAPK container metadata
pub mod dex;
/// Paginated discovery of packages from developer listing pages
pub mod discovery;
/// Error handling types and utilities
pub mod error;
/// Artifact retrieval from the distribution site's download pages
pub mod fetch;
/// Persisted per-identity version ledger
pub mod ledger;
/// Logging configuration and utilities
pub mod logging;
/// Orchestration of the per-item processing state machine
pub mod pipeline;
/// Bounded-time subprocess supervision
pub mod process;
/// Published-version extraction from item detail pages
pub mod version;

// Re-export common types
pub use config::Config;
pub use discovery::CatalogEntry;
pub use error::{HarvestError, Result};
pub use fetch::RetrievedArtifact;
pub use ledger::VersionLedger;
pub use pipeline::{ItemOutcome, Pipeline, RunSummary};

/// Default worker-thread count for the decompiler, one per available core
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
