//! Top-level run orchestration
//!
//! A [`Treesum`] instance ties the pieces together: resolve the plan file,
//! read the previous export if verification wants it, execute the walk,
//! diff against the previous snapshot and write the new export.

use crate::algorithm::Algorithm;
use crate::config::{Concurrency, Verification};
use crate::diff::Diff;
use crate::error::{Result, TreesumError};
use crate::plan::HashPlan;
use crate::results::HashResults;
use crate::walker;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Builder for [`Treesum`] with the defaults: SHA-1, one worker per CPU,
/// verification off
#[derive(Debug, Default)]
pub struct TreesumBuilder {
    algorithm: Option<Algorithm>,
    concurrency: Concurrency,
    verification: Verification,
}

impl TreesumBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the digest algorithm (default: SHA-1)
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Set the worker concurrency (default: one worker per CPU)
    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the verification mode (default: off)
    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Build the configured instance
    pub fn build(self) -> Treesum {
        Treesum {
            algorithm: self.algorithm.unwrap_or(Algorithm::Sha1),
            concurrency: self.concurrency,
            verification: self.verification,
        }
    }
}

/// A configured fingerprinting run
#[derive(Debug)]
pub struct Treesum {
    algorithm: Algorithm,
    concurrency: Concurrency,
    verification: Verification,
}

impl Treesum {
    /// Start building an instance
    pub fn builder() -> TreesumBuilder {
        TreesumBuilder::new()
    }

    /// Execute the plan at `plan_path`, optionally verifying against and
    /// then (re)writing the export at `export_path`.
    ///
    /// Returns the new results; callers typically print
    /// `hex::encode(results.total_hash())`.
    pub fn run(&self, plan_path: &Path, export_path: Option<&Path>) -> Result<HashResults> {
        if !plan_path.exists() {
            return Err(TreesumError::PlanNotFound(plan_path.to_path_buf()));
        }
        if export_path.is_none() && self.verification == Verification::Require {
            return Err(TreesumError::ExportRequired(
                "[export file] was not provided".to_string(),
            ));
        }
        let previous = match export_path {
            Some(export) => self.read_previous_export(export)?,
            None => {
                debug!("Export file was not defined, skipping export ...");
                None
            }
        };

        let plan = HashPlan::from_file(plan_path)?;
        let workers = self.concurrency.resolve();
        info!(
            "Executing hash plan with algorithm {} and {} workers ...",
            self.algorithm, workers
        );
        let mapping = walker::walk(&plan, self.algorithm, workers)?;
        let results = HashResults::from_sorted_entries(self.algorithm, mapping.iter());

        if let Some(export) = export_path {
            self.export_results(export, previous.as_ref(), &results)?;
        }
        Ok(results)
    }

    /// Read the previous export according to the verification mode: OFF
    /// never reads, WARN tolerates missing or unreadable files, REQUIRE
    /// does not
    fn read_previous_export(&self, export: &Path) -> Result<Option<HashResults>> {
        if self.verification == Verification::Off {
            return Ok(None);
        }
        if !export.exists() {
            if self.verification == Verification::Require {
                return Err(TreesumError::ExportRequired(format!(
                    "previous [export file] was not found: {export:?}"
                )));
            }
            return Ok(None);
        }
        match HashResults::read_file(self.algorithm, export) {
            Ok(results) => Ok(Some(results)),
            Err(e) if self.verification == Verification::Require => Err(e),
            Err(e) => {
                warn!("Could not read the previous [export file]: {e}");
                Ok(None)
            }
        }
    }

    /// Diff against the previous snapshot, enforce REQUIRE, and write the
    /// new export unless it is byte-identical to the previous one
    fn export_results(
        &self,
        export: &Path,
        previous: Option<&HashResults>,
        results: &HashResults,
    ) -> Result<()> {
        if let Some(previous) = previous {
            if previous == results {
                debug!("Previous hash result was identical, no need to update the [export file]: {export:?}");
                return Ok(());
            }
            self.log_diff(previous, results)?;
            if self.verification == Verification::Require {
                // abort without touching the export file
                return Err(TreesumError::VerificationMismatch);
            }
        }
        results.export(export)
    }

    fn log_diff(&self, previous: &HashResults, results: &HashResults) -> Result<()> {
        let previous_map = match previous.to_map() {
            Ok(map) => map,
            Err(e) if self.verification == Verification::Require => return Err(e),
            Err(e) => {
                warn!("Could not diff against the previous [export file]: {e}");
                return Ok(());
            }
        };
        let diff = Diff::compute(&previous_map, &results.to_map()?);
        let message = if diff.is_empty() {
            "Running diff against previous [export file] produced no differences, \
             but the exports were not identical"
                .to_string()
        } else {
            diff.to_string()
        };
        match self.verification {
            Verification::Require => error!("{message}"),
            _ => warn!("{message}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn treesum(verification: Verification) -> Treesum {
        Treesum::builder()
            .algorithm(Algorithm::Sha1)
            .concurrency(Concurrency::Fixed(2))
            .verification(verification)
            .build()
    }

    #[test]
    fn test_run_without_export() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let results = treesum(Verification::Off).run(dir.path(), None).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_require_without_export_path() {
        let dir = TempDir::new().unwrap();
        let err = treesum(Verification::Require)
            .run(dir.path(), None)
            .unwrap_err();
        assert!(matches!(err, TreesumError::ExportRequired(_)));
    }

    #[test]
    fn test_require_without_previous_export_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let export = dir.path().join("snapshot.txt");
        let err = treesum(Verification::Require)
            .run(dir.path(), Some(&export))
            .unwrap_err();
        assert!(matches!(err, TreesumError::ExportRequired(_)));
        assert!(!export.exists());
    }

    #[test]
    fn test_export_write_and_identical_skip() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("a.txt"), b"hi").unwrap();
        let export = dir.path().join("snapshot.txt");

        let first = treesum(Verification::Warn)
            .run(&tree, Some(&export))
            .unwrap();
        assert_eq!(fs::read(&export).unwrap(), first.as_bytes());

        // unchanged tree verifies cleanly under REQUIRE
        let second = treesum(Verification::Require)
            .run(&tree, Some(&export))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_require_mismatch_preserves_export() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("a.txt"), b"hi").unwrap();
        let export = dir.path().join("snapshot.txt");

        treesum(Verification::Warn).run(&tree, Some(&export)).unwrap();
        let exported = fs::read(&export).unwrap();

        fs::write(tree.join("a.txt"), b"changed").unwrap();
        let err = treesum(Verification::Require)
            .run(&tree, Some(&export))
            .unwrap_err();
        assert!(matches!(err, TreesumError::VerificationMismatch));
        // the export file was not overwritten
        assert_eq!(fs::read(&export).unwrap(), exported);
    }

    #[test]
    fn test_warn_tolerates_corrupt_previous_export() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("a.txt"), b"hi").unwrap();
        let export = dir.path().join("snapshot.txt");
        fs::write(&export, b"not a valid export\n").unwrap();

        let results = treesum(Verification::Warn)
            .run(&tree, Some(&export))
            .unwrap();
        // corrupt previous export is treated as absent and overwritten
        assert_eq!(fs::read(&export).unwrap(), results.as_bytes());
    }
}
