//! Error types for the treesum library
//!
//! All fallible operations return [`Result<T>`]. Variants are grouped into
//! the same families the CLI maps to exit codes: argument/configuration
//! errors, hash plan errors, export file errors, and execution errors.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the treesum library
pub type Result<T> = std::result::Result<T, TreesumError>;

/// Main error type for all treesum operations
#[derive(Debug, Error)]
pub enum TreesumError {
    /// Algorithm name could not be resolved to a supported digest
    #[error("Unsupported algorithm: '{name}', supported algorithms are: {supported}")]
    UnsupportedAlgorithm {
        /// The name that failed to resolve
        name: String,
        /// Comma-separated list of supported algorithm names
        supported: String,
    },

    /// Command line argument was malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Concurrency value was out of range or unparseable
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(String),

    /// Verification mode was not one of off/warn/require
    #[error("Invalid verification mode: '{0}', allowed values: off, warn, require")]
    InvalidVerification(String),

    /// Hash plan file or directory does not exist
    #[error("[hash plan] must point to an existing file or directory, got: {0:?}")]
    PlanNotFound(PathBuf),

    /// Hash plan file could not be read
    #[error("Error reading [hash plan] {path:?}: {source}")]
    PlanRead {
        /// Path to the plan file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Hash plan grammar violation (duplicate base path, empty pattern, ...)
    #[error("Error parsing [hash plan]: {0}")]
    PlanParse(String),

    /// Verification is 'require' but no export file was provided or found
    #[error("[verification] is set to 'require', but {0}")]
    ExportRequired(String),

    /// Previous export file could not be read
    #[error("Could not read the previous [export file] {path:?}: {source}")]
    ExportRead {
        /// Path to the export file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Previous export file is malformed
    #[error("Cannot parse export line #{line}: {message}")]
    ExportParse {
        /// 1-based line number of the offending line
        line: usize,
        /// Description of the malformation
        message: String,
    },

    /// Verification is 'require' and the current tree differs from the export
    #[error("[verification] was set to 'require', but there was a difference in export results")]
    VerificationMismatch,

    /// New export file could not be written
    #[error("Error occurred while writing to [export file] {path:?}: {source}")]
    ExportWrite {
        /// Path to the export file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Filesystem error during the tree walk, aborts the whole run
    #[error("Error while walking {path:?}: {source}")]
    WalkIo {
        /// Path that failed to list or read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A discovered path does not start with the plan's base path
    #[error("Child path '{path}' does not start with base path '{base}'")]
    PathOutsideBase {
        /// The offending absolute path
        path: String,
        /// The plan's base path
        base: String,
    },

    /// A discovered path is not valid UTF-8 and cannot be exported
    #[error("Path is not valid UTF-8: {0:?}")]
    PathNotUtf8(PathBuf),

    /// Generic I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Numeric exit code families mirrored by the CLI.
///
/// Success is 0, generic failures are 1. Everything else gets a distinct
/// small code so callers in scripts can tell the failure families apart:
/// 1x for argument errors, 2x for hash plan errors, 3x for export file
/// errors, 40 for execution failures.
pub mod exit {
    /// Run completed and the summary hash was printed
    pub const SUCCESS: u8 = 0;
    /// Unclassified failure
    pub const ERROR_GENERIC: u8 = 1;

    /// Invalid command line argument
    pub const INVALID_ARGUMENT: u8 = 10;
    /// Unknown or unsupported algorithm
    pub const INVALID_ALGORITHM: u8 = 12;
    /// Concurrency out of range or unparseable
    pub const INVALID_CONCURRENCY: u8 = 14;
    /// Unknown verification mode
    pub const INVALID_VERIFICATION: u8 = 15;

    /// Hash plan missing
    pub const PLAN_NOT_FOUND: u8 = 22;
    /// Hash plan unreadable or malformed
    pub const PLAN_ERROR: u8 = 24;

    /// Export required by verification but not provided or found
    pub const EXPORT_REQUIRED: u8 = 30;
    /// Verification mismatch under 'require'
    pub const VERIFICATION_MISMATCH: u8 = 34;
    /// Export unreadable or malformed under 'require'
    pub const EXPORT_READ_ERROR: u8 = 36;
    /// Export file could not be written
    pub const EXPORT_WRITE_ERROR: u8 = 37;

    /// Failure while executing the hash plan
    pub const EXECUTION_ERROR: u8 = 40;
}

impl TreesumError {
    /// Map this error to its process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            TreesumError::InvalidArgument(_) => exit::INVALID_ARGUMENT,
            TreesumError::UnsupportedAlgorithm { .. } => exit::INVALID_ALGORITHM,
            TreesumError::InvalidConcurrency(_) => exit::INVALID_CONCURRENCY,
            TreesumError::InvalidVerification(_) => exit::INVALID_VERIFICATION,
            TreesumError::PlanNotFound(_) => exit::PLAN_NOT_FOUND,
            TreesumError::PlanRead { .. } | TreesumError::PlanParse(_) => exit::PLAN_ERROR,
            TreesumError::ExportRequired(_) => exit::EXPORT_REQUIRED,
            TreesumError::ExportRead { .. } | TreesumError::ExportParse { .. } => {
                exit::EXPORT_READ_ERROR
            }
            TreesumError::VerificationMismatch => exit::VERIFICATION_MISMATCH,
            TreesumError::ExportWrite { .. } => exit::EXPORT_WRITE_ERROR,
            TreesumError::WalkIo { .. }
            | TreesumError::PathOutsideBase { .. }
            | TreesumError::PathNotUtf8(_) => exit::EXECUTION_ERROR,
            TreesumError::Io(_) => exit::ERROR_GENERIC,
        }
    }

    /// Check whether this error is an export read/parse problem, which is
    /// recoverable under the 'warn' and 'off' verification modes
    pub fn is_export_parse(&self) -> bool {
        matches!(
            self,
            TreesumError::ExportParse { .. } | TreesumError::ExportRead { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreesumError::ExportParse {
            line: 3,
            message: "path was empty".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot parse export line #3: path was empty");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            TreesumError::VerificationMismatch.exit_code(),
            exit::VERIFICATION_MISMATCH
        );
        assert_eq!(
            TreesumError::PlanNotFound(PathBuf::from("nope")).exit_code(),
            exit::PLAN_NOT_FOUND
        );
        assert_eq!(
            TreesumError::InvalidConcurrency("0".into()).exit_code(),
            exit::INVALID_CONCURRENCY
        );
        assert_eq!(
            TreesumError::InvalidArgument("p.plan/".into()).exit_code(),
            exit::INVALID_ARGUMENT
        );
    }

    #[test]
    fn test_export_parse_recoverable() {
        let parse = TreesumError::ExportParse {
            line: 1,
            message: "bad hex".into(),
        };
        assert!(parse.is_export_parse());
        assert!(!TreesumError::VerificationMismatch.is_export_parse());
    }
}
