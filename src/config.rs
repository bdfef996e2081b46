//! Run parameters: worker concurrency and snapshot verification mode
//!
//! Both parameters are parsed and validated eagerly, before any filesystem
//! work starts, so a bad value can never abort a half-finished run.

use crate::error::{Result, TreesumError};
use std::fmt;
use std::str::FromStr;

/// Lowest accepted worker count
pub const MIN_CONCURRENCY: usize = 1;
/// Highest accepted worker count
pub const MAX_CONCURRENCY: usize = 1024;

/// Lowest accepted CPU-relative factor
pub const MIN_CPU_FACTOR: f64 = 0.1;
/// Highest accepted CPU-relative factor
pub const MAX_CPU_FACTOR: f64 = 16.0;

/// Number of walker workers, either absolute or relative to the CPU count
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Concurrency {
    /// Exact worker count
    Fixed(usize),
    /// Worker count = round(factor * available CPUs), clamped to the fixed range
    CpuRelative(f64),
}

impl Concurrency {
    /// Validate a fixed worker count
    pub fn fixed(concurrency: usize) -> Result<Self> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(TreesumError::InvalidConcurrency(format!(
                "fixed concurrency must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got: {concurrency}"
            )));
        }
        Ok(Concurrency::Fixed(concurrency))
    }

    /// Validate a CPU-relative factor
    pub fn cpu_relative(factor: f64) -> Result<Self> {
        if !factor.is_finite() || !(MIN_CPU_FACTOR..=MAX_CPU_FACTOR).contains(&factor) {
            return Err(TreesumError::InvalidConcurrency(format!(
                "CPU-relative factor must be between {MIN_CPU_FACTOR} and {MAX_CPU_FACTOR}, got: {factor}"
            )));
        }
        Ok(Concurrency::CpuRelative(factor))
    }

    /// Resolve to an actual worker count
    pub fn resolve(&self) -> usize {
        match *self {
            Concurrency::Fixed(concurrency) => concurrency,
            Concurrency::CpuRelative(factor) => {
                let calculated = (factor * num_cpus::get() as f64).round() as usize;
                calculated.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
            }
        }
    }
}

impl Default for Concurrency {
    /// One worker per available CPU
    fn default() -> Self {
        Concurrency::CpuRelative(1.0)
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Fixed(concurrency) => write!(f, "{concurrency}"),
            Concurrency::CpuRelative(factor) => write!(f, "cpu*{factor}"),
        }
    }
}

impl FromStr for Concurrency {
    type Err = TreesumError;

    /// Accepts `"8"`, `"cpu"` and `"cpu*1.5"`
    fn from_str(value: &str) -> Result<Self> {
        let lower = value.trim().to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("cpu") {
            let factor = match rest.trim().strip_prefix('*') {
                None if rest.trim().is_empty() => 1.0,
                Some(multiplier) => multiplier.trim().parse::<f64>().map_err(|_| {
                    TreesumError::InvalidConcurrency(format!(
                        "could not parse CPU-relative concurrency: {value}"
                    ))
                })?,
                None => {
                    return Err(TreesumError::InvalidConcurrency(format!(
                        "could not parse CPU-relative concurrency: {value}"
                    )))
                }
            };
            return Concurrency::cpu_relative(factor);
        }
        let concurrency = lower.parse::<usize>().map_err(|_| {
            TreesumError::InvalidConcurrency(format!("could not parse fixed concurrency: {value}"))
        })?;
        Concurrency::fixed(concurrency)
    }
}

/// What to do with a previous export file, if one exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verification {
    /// Never read or compare a previous export
    #[default]
    Off,
    /// Compare if a previous export exists and parses, log differences, proceed
    Warn,
    /// Previous export must exist, parse and match exactly, otherwise abort
    Require,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verification::Off => "off",
            Verification::Warn => "warn",
            Verification::Require => "require",
        })
    }
}

impl FromStr for Verification {
    type Err = TreesumError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Verification::Off),
            "warn" => Ok(Verification::Warn),
            "require" => Ok(Verification::Require),
            _ => Err(TreesumError::InvalidVerification(value.to_string())),
        }
    }
}
