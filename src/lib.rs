//! # Treesum - deterministic directory tree fingerprints
//!
//! Treesum walks a set of files and directories, hashes every file's
//! contents with a chosen digest algorithm and combines the individual
//! hashes into one canonical summary hash. It can also verify the current
//! tree against a previously recorded snapshot, reporting additions,
//! deletions, content modifications and renames.
//!
//! ## Overview
//!
//! - **Hash plans** select what to fingerprint: a base path, whitelist
//!   roots under it and optional ignore patterns
//! - **Concurrent walking** discovers files with a bounded worker pool and
//!   a dynamically growing work queue
//! - **Canonical exports** serialize one `<hex digest> <relative path>`
//!   line per file, sorted by path, so the summary hash never depends on
//!   discovery order
//! - **Snapshot diffing** reconciles two exports by content hash,
//!   detecting renames without reading file contents twice
//! - **Git compatibility**: the synthetic `GIT` algorithm reproduces
//!   `git hash-object` blob IDs exactly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treesum::{Algorithm, Concurrency, Treesum, Verification};
//! use std::path::Path;
//!
//! # fn main() -> treesum::Result<()> {
//! let treesum = Treesum::builder()
//!     .algorithm(Algorithm::Sha256)
//!     .concurrency(Concurrency::Fixed(8))
//!     .verification(Verification::Warn)
//!     .build();
//!
//! let results = treesum.run(
//!     Path::new("./tree.plan"),
//!     Some(Path::new("./tree.export")),
//! )?;
//! println!("{}", hex::encode(results.total_hash()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`algorithm`]: digest selection and the Git blob envelope
//! - [`plan`]: hash plan grammar and blacklist compilation
//! - [`walker`]: the concurrent tree walker
//! - [`results`]: canonical serialization and the summary hash
//! - [`diff`]: snapshot reconciliation
//! - [`config`]: concurrency and verification parameters
//! - [`error`]: error types and exit code mapping

pub mod algorithm;
pub mod config;
pub mod diff;
pub mod error;
pub mod plan;
pub mod results;
pub mod treesum;
pub mod walker;

mod hasher;

// Re-export main types for convenience
pub use algorithm::{Algorithm, SUPPORTED_ALGORITHMS};
pub use config::{Concurrency, Verification};
pub use diff::Diff;
pub use error::{Result, TreesumError};
pub use plan::HashPlan;
pub use results::HashResults;
pub use treesum::{Treesum, TreesumBuilder};
