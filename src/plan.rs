//! Hash plan parsing
//!
//! A hash plan tells one run what to fingerprint: an absolute base path, a
//! whitelist of roots under it, and an optional blacklist of ignore
//! patterns. Plans are immutable once built.
//!
//! ## Plan grammar
//!
//! One directive per line; trailing whitespace is trimmed and empty lines
//! are skipped:
//!
//! - `@path/` overrides the base path (at most one distinct override)
//! - `!pattern` adds a blacklist pattern, where `*` matches any run of
//!   characters (including `/`)
//! - `#` starts a comment
//! - a leading `\` escapes a filename that would otherwise be read as a
//!   control line
//! - anything else is a whitelist entry relative to the base path
//!
//! Pointing the plan at a directory instead of a file yields a synthetic
//! empty plan: hash the whole directory.

use crate::error::{Result, TreesumError};
use regex::Regex;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Resolved instructions for one hashing run
#[derive(Debug)]
pub struct HashPlan {
    /// Absolute base path, forward slashes, exactly one trailing `/`.
    /// All relative path resolution strips this prefix.
    pub base_path: String,
    /// Absolute whitelist roots, ordered, deduplicated, never empty
    pub whitelist: Vec<String>,
    /// Single combined ignore pattern, anchored to the whole relative path
    pub blacklist: Option<Regex>,
}

impl HashPlan {
    /// Load and parse a plan from `path`.
    ///
    /// A directory yields a synthetic empty plan rooted at that directory.
    pub fn from_file(path: &Path) -> Result<HashPlan> {
        let canonical = path
            .canonicalize()
            .map_err(|_| TreesumError::PlanNotFound(path.to_path_buf()))?;
        if canonical.is_dir() {
            debug!("Hash plan was a directory, proceeding with synthetic [hash plan] instead ...");
            return Self::parse(&canonical, "");
        }

        debug!("Reading hash plan: {:?} ...", canonical);
        let bytes = std::fs::read(&canonical).map_err(|source| TreesumError::PlanRead {
            path: canonical.clone(),
            source,
        })?;
        // strict UTF-8: a lossy decode would silently corrupt filenames
        let text = String::from_utf8(bytes).map_err(|e| {
            TreesumError::PlanParse(format!("[hash plan] is not valid UTF-8: {e}"))
        })?;
        let parent = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(canonical);
        Self::parse(&parent, &text)
    }

    /// Parse plan text, resolving relative entries against `plan_parent`
    pub fn parse(plan_parent: &Path, plan: &str) -> Result<HashPlan> {
        let lines: Vec<&str> = plan
            .lines()
            .map(|line| line.trim_end_matches([' ', '\t']))
            .filter(|line| !line.is_empty())
            .collect();
        trace!("Read hash plan: {} directive lines", lines.len());

        let base_path = resolve_base_path(plan_parent, &lines)?;
        debug!("Using base path: '{}'", base_path);

        let blacklist = compile_blacklist(&lines)?;
        let whitelist = extract_whitelist(&base_path, &lines);
        Ok(HashPlan {
            base_path,
            whitelist,
            blacklist,
        })
    }
}

/// Canonicalize a directory into the base path string form: forward
/// slashes, exactly one trailing slash
fn canonical_base_string(dir: &Path) -> Result<String> {
    let canonical = dir.canonicalize().map_err(|source| TreesumError::PlanRead {
        path: dir.to_path_buf(),
        source,
    })?;
    let text = canonical
        .to_str()
        .ok_or_else(|| TreesumError::PathNotUtf8(canonical.clone()))?
        .replace('\\', "/");
    Ok(format!("{}/", text.trim_end_matches('/')))
}

fn resolve_base_path(plan_parent: &Path, lines: &[&str]) -> Result<String> {
    let mut overrides: Vec<&str> = Vec::new();
    for line in lines {
        if line.starts_with('@') && !overrides.contains(line) {
            overrides.push(line);
        }
    }
    trace!("Found {} distinct base path overrides in hash plan", overrides.len());
    if overrides.len() > 1 {
        return Err(TreesumError::PlanParse(format!(
            "there is more than one base path override: '{}'",
            overrides.join("', '")
        )));
    }

    let dir = match overrides.first() {
        None => plan_parent.to_path_buf(),
        Some(line) => {
            let rel = &line[1..];
            if rel.is_empty() {
                return Err(TreesumError::PlanParse(
                    "base path override cannot be empty".to_string(),
                ));
            }
            if !rel.ends_with('/') {
                warn!("Relative base path should end with a trailing slash, adding the slash: '{line}/'");
            }
            plan_parent.join(rel)
        }
    };
    canonical_base_string(&dir)
}

/// Compile all `!` patterns into one combined, fully anchored regex.
/// `*` becomes `.*`; everything else is matched literally.
fn compile_blacklist(lines: &[&str]) -> Result<Option<Regex>> {
    let mut patterns: Vec<String> = Vec::new();
    for line in lines {
        if let Some(pattern) = line.strip_prefix('!') {
            if pattern.is_empty() {
                return Err(TreesumError::PlanParse(
                    "blacklist pattern cannot be empty".to_string(),
                ));
            }
            let translated = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            if !patterns.contains(&translated) {
                patterns.push(translated);
            }
        }
    }

    if patterns.is_empty() {
        debug!("No blacklist patterns to compile");
        return Ok(None);
    }
    debug!("Compiling {} blacklist patterns", patterns.len());
    let combined = format!("^(?:{})$", patterns.join("|"));
    let regex = Regex::new(&combined)
        .map_err(|e| TreesumError::PlanParse(format!("could not compile blacklist: {e}")))?;
    Ok(Some(regex))
}

fn extract_whitelist(base_path: &str, lines: &[&str]) -> Vec<String> {
    let mut whitelist: Vec<String> = Vec::new();
    for line in lines {
        let entry = match line.chars().next() {
            Some('@') | Some('!') | Some('#') => continue,
            Some('\\') => &line[1..],
            _ => line,
        };

        let suffix = match entry {
            "." => {
                warn!("Relative path '.' is a directory - please append a trailing / to this whitelist entry");
                ""
            }
            "./" => "",
            other => other,
        };
        let absolute = format!("{base_path}{suffix}");
        if whitelist.contains(&absolute) {
            warn!("Whitelist entry '{line}' is a duplicate - please review the [hash plan]");
        } else {
            whitelist.push(absolute);
        }
    }

    if whitelist.is_empty() {
        debug!("No whitelist entries found, adding base path as default");
        whitelist.push(base_path.to_string());
    }
    whitelist
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_of(dir: &TempDir) -> String {
        canonical_base_string(dir.path()).unwrap()
    }

    #[test]
    fn test_empty_plan_defaults_to_parent() {
        let dir = TempDir::new().unwrap();
        let plan = HashPlan::parse(dir.path(), "").unwrap();
        assert_eq!(plan.base_path, base_of(&dir));
        assert_eq!(plan.whitelist, vec![base_of(&dir)]);
        assert!(plan.blacklist.is_none());
    }

    #[test]
    fn test_whitelist_entries_and_comments() {
        let dir = TempDir::new().unwrap();
        let plan = HashPlan::parse(dir.path(), "# header\nsrc/\nREADME.md\t\nsrc/\n").unwrap();
        let base = base_of(&dir);
        // duplicate src/ dropped, comment skipped, trailing tab trimmed
        assert_eq!(
            plan.whitelist,
            vec![format!("{base}src/"), format!("{base}README.md")]
        );
    }

    #[test]
    fn test_escaped_control_line() {
        let dir = TempDir::new().unwrap();
        let plan = HashPlan::parse(dir.path(), "\\#not-a-comment\n\\!bang.txt\n").unwrap();
        let base = base_of(&dir);
        assert_eq!(
            plan.whitelist,
            vec![format!("{base}#not-a-comment"), format!("{base}!bang.txt")]
        );
    }

    #[test]
    fn test_base_path_override() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let plan = HashPlan::parse(dir.path(), "@sub/\n").unwrap();
        assert!(plan.base_path.ends_with("sub/"));
        assert_eq!(plan.whitelist, vec![plan.base_path.clone()]);
    }

    #[test]
    fn test_conflicting_base_path_overrides() {
        let dir = TempDir::new().unwrap();
        let err = HashPlan::parse(dir.path(), "@a/\n@b/\n").unwrap_err();
        assert!(matches!(err, TreesumError::PlanParse(_)));
        // same override twice is not a conflict
        fs::create_dir(dir.path().join("a")).unwrap();
        assert!(HashPlan::parse(dir.path(), "@a/\n@a/\n").is_ok());
    }

    #[test]
    fn test_empty_override_and_empty_pattern() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            HashPlan::parse(dir.path(), "@\n").unwrap_err(),
            TreesumError::PlanParse(_)
        ));
        assert!(matches!(
            HashPlan::parse(dir.path(), "!\n").unwrap_err(),
            TreesumError::PlanParse(_)
        ));
    }

    #[test]
    fn test_blacklist_globs() {
        let dir = TempDir::new().unwrap();
        let plan = HashPlan::parse(dir.path(), "!*.tmp\n!target/\n").unwrap();
        let blacklist = plan.blacklist.unwrap();
        assert!(blacklist.is_match("output.tmp"));
        assert!(blacklist.is_match("build/output.tmp"));
        assert!(blacklist.is_match("target/"));
        assert!(!blacklist.is_match("build/"));
        assert!(!blacklist.is_match("tmp.txt"));
        // dots are literal, not regex wildcards
        assert!(!blacklist.is_match("outputxtmp"));
    }

    #[test]
    fn test_plan_file_loading() {
        let dir = TempDir::new().unwrap();
        let plan_path = dir.path().join("tree.plan");
        fs::write(&plan_path, "# plan\n!*.log\n").unwrap();
        let plan = HashPlan::from_file(&plan_path).unwrap();
        assert_eq!(plan.base_path, base_of(&dir));
        assert!(plan.blacklist.unwrap().is_match("a.log"));

        // a directory works as a synthetic whole-tree plan
        let plan = HashPlan::from_file(dir.path()).unwrap();
        assert_eq!(plan.whitelist, vec![base_of(&dir)]);

        let err = HashPlan::from_file(&dir.path().join("missing.plan")).unwrap_err();
        assert!(matches!(err, TreesumError::PlanNotFound(_)));
    }

    #[test]
    fn test_plan_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let plan_path = dir.path().join("bad.plan");
        fs::write(&plan_path, [0x66, 0xff, 0xfe]).unwrap();
        let err = HashPlan::from_file(&plan_path).unwrap_err();
        assert!(matches!(err, TreesumError::PlanParse(_)));
    }
}
