//! CLI-level tests for the treesum binary
//!
//! Spawns the compiled binary and checks stdout, stderr and the process
//! exit code families.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn treesum() -> Command {
    Command::new(env!("CARGO_BIN_EXE_treesum"))
}

#[test]
fn test_summary_hash_alone_on_stdout() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hi").unwrap();

    let output = treesum().arg(tmp.path()).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary = stdout.trim_end();
    assert_eq!(summary.len(), 40);
    assert!(summary.bytes().all(|b| b.is_ascii_hexdigit()));
    assert!(!stdout.trim_end().contains('\n'));
}

#[test]
fn test_slash_suffixed_plan_file_is_an_argument_error() {
    let tmp = TempDir::new().unwrap();
    let plan = tmp.path().join("p.plan");
    fs::write(&plan, "").unwrap();

    let output = treesum()
        .arg(format!("{}/", plan.display()))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("must not end with a slash"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_slash_suffixed_export_file_is_an_argument_error() {
    let tmp = TempDir::new().unwrap();
    let tree = tmp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    fs::write(tree.join("a.txt"), "hi").unwrap();
    let export = tmp.path().join("exp.file");
    fs::write(&export, "").unwrap();

    let output = treesum()
        .arg(&tree)
        .arg(format!("{}/", export.display()))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("must not end with a slash"),
        "unexpected stderr: {stderr}"
    );
    // the pre-existing file was not touched
    assert_eq!(fs::read(&export).unwrap(), b"");
}

#[test]
fn test_slash_suffixed_directory_is_fine() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hi").unwrap();

    let output = treesum()
        .arg(format!("{}/", tmp.path().display()))
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
}

#[test]
fn test_missing_plan_exit_code() {
    let tmp = TempDir::new().unwrap();
    let output = treesum()
        .arg(tmp.path().join("no-such.plan"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(22));
}

#[test]
fn test_unknown_algorithm_exit_code() {
    let tmp = TempDir::new().unwrap();
    let output = treesum()
        .args(["-a", "sha-3"])
        .arg(tmp.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(12));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unsupported algorithm"), "{stderr}");
}
