//! Treesum CLI
//!
//! Hashes a directory tree according to a hash plan and prints the summary
//! hash on stdout. All diagnostics go to stderr; failures map to distinct
//! exit code families (argument 1x, plan 2x, export 3x, execution 40) so
//! scripts can tell them apart.
//!
//! ```bash
//! # hash the current directory with defaults
//! treesum .
//!
//! # hash per plan, verify against and refresh the export file
//! treesum -a sha-256 -c cpu*2 -v require build.plan build.export
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use treesum::error::exit;
use treesum::{Algorithm, Concurrency, Result, Treesum, TreesumError, Verification};

/// Deterministic directory tree fingerprints with snapshot verification
#[derive(Parser)]
#[command(name = "treesum")]
#[command(version)]
#[command(about = "Hash a directory tree into one summary hash, verifying against a previous snapshot")]
struct Cli {
    /// Digest algorithm (git, md5, sha-1, sha-256, sha-384, sha-512)
    #[arg(short, long, default_value = "sha-1")]
    algorithm: String,

    /// Worker concurrency: a number, 'cpu', or 'cpu*<factor>'
    #[arg(short, long, default_value = "cpu")]
    concurrency: String,

    /// Verification against the previous export: off, warn or require
    #[arg(short, long, default_value = "off")]
    verification: String,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Hash plan file, or a directory to hash in full
    plan: PathBuf,

    /// Export file to verify against and rewrite
    export: Option<PathBuf>,
}

fn run(cli: &Cli) -> Result<()> {
    let algorithm: Algorithm = cli.algorithm.parse()?;
    let concurrency: Concurrency = cli.concurrency.parse()?;
    let verification: Verification = cli.verification.parse()?;

    // a plan that names a file must not carry a trailing separator,
    // catching shell completion accidents before any work starts
    check_no_trailing_slash(&cli.plan, "[hash plan file]")?;
    if let Some(export) = &cli.export {
        check_no_trailing_slash(export, "[export file]")?;
    }

    let results = Treesum::builder()
        .algorithm(algorithm)
        .concurrency(concurrency)
        .verification(verification)
        .build()
        .run(&cli.plan, cli.export.as_deref())?;

    println!("{}", hex::encode(results.total_hash()));
    Ok(())
}

fn check_no_trailing_slash(path: &Path, what: &str) -> Result<()> {
    let text = path.to_string_lossy();
    // the separator must come off before the file check: stat on a
    // slash-suffixed file path fails outright instead of finding the file
    if text.ends_with(['/', '\\'])
        && Path::new(text.trim_end_matches(['/', '\\'])).is_file()
    {
        return Err(TreesumError::InvalidArgument(format!(
            "the {what} must not end with a slash: {text}"
        )));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::from(exit::SUCCESS),
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
