//! Snapshot reconciliation: added, renamed, modified and deleted paths
//!
//! Compares two path -> digest mappings by content hash. A path that only
//! exists in the current mapping starts out as a tentative Add; if a
//! deleted path from the previous mapping carries the same hash, the first
//! unclaimed Add with that hash is promoted to a Rename instead.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

use crate::results::PathHashMap;

/// A path present only in the current snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    /// New relative path
    pub path: String,
    /// Content digest
    pub hash: Vec<u8>,
}

/// A path whose content moved unchanged from one path to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    /// Path in the previous snapshot
    pub old_path: String,
    /// Path in the current snapshot
    pub new_path: String,
    /// Content digest, identical on both sides
    pub hash: Vec<u8>,
}

/// A path present in both snapshots with different content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modified {
    /// Relative path
    pub path: String,
    /// Digest in the previous snapshot
    pub old_hash: Vec<u8>,
    /// Digest in the current snapshot
    pub new_hash: Vec<u8>,
}

/// A path present only in the previous snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    /// Old relative path
    pub path: String,
    /// Content digest it used to have
    pub hash: Vec<u8>,
}

/// The difference between two snapshots; empty iff they are identical
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Paths only in the current snapshot, in current path order
    pub added: Vec<Added>,
    /// Same-hash moves, in current path order of the new path
    pub renamed: Vec<Renamed>,
    /// Changed content, in current path order
    pub modified: Vec<Modified>,
    /// Paths only in the previous snapshot, in previous path order
    pub deleted: Vec<Deleted>,
}

/// A tentative Add that may still be promoted to a Rename
struct AddRename {
    dst_path: String,
    dst_hash: Vec<u8>,
    src_path: Option<String>,
}

impl Diff {
    /// Compute the difference from `previous` to `current`
    pub fn compute(previous: &PathHashMap, current: &PathHashMap) -> Diff {
        // hash -> indices into `tentative`, grouped in discovery order
        let mut by_hash: IndexMap<&[u8], Vec<usize>> = IndexMap::new();
        let mut tentative: Vec<AddRename> = Vec::new();
        let mut modified = Vec::new();
        let mut matched: HashSet<&str> = HashSet::new();

        for (dst_path, dst_hash) in current {
            match previous.get(dst_path) {
                Some(src_hash) => {
                    matched.insert(dst_path.as_str());
                    if src_hash != dst_hash {
                        modified.push(Modified {
                            path: dst_path.clone(),
                            old_hash: src_hash.clone(),
                            new_hash: dst_hash.clone(),
                        });
                    }
                }
                None => {
                    by_hash
                        .entry(dst_hash.as_slice())
                        .or_default()
                        .push(tentative.len());
                    tentative.push(AddRename {
                        dst_path: dst_path.clone(),
                        dst_hash: dst_hash.clone(),
                        src_path: None,
                    });
                }
            }
        }

        let mut deleted = Vec::new();
        for (src_path, src_hash) in previous {
            if matched.contains(src_path.as_str()) {
                continue;
            }
            // first unclaimed tentative Add with the same hash wins
            let claimed = by_hash.get(src_hash.as_slice()).and_then(|indices| {
                indices
                    .iter()
                    .find(|i| tentative[**i].src_path.is_none())
                    .copied()
            });
            match claimed {
                Some(index) => tentative[index].src_path = Some(src_path.clone()),
                None => deleted.push(Deleted {
                    path: src_path.clone(),
                    hash: src_hash.clone(),
                }),
            }
        }

        let mut added = Vec::new();
        let mut renamed = Vec::new();
        for entry in tentative {
            match entry.src_path {
                None => added.push(Added {
                    path: entry.dst_path,
                    hash: entry.dst_hash,
                }),
                Some(old_path) => renamed.push(Renamed {
                    old_path,
                    new_path: entry.dst_path,
                    hash: entry.dst_hash,
                }),
            }
        }

        Diff {
            added,
            renamed,
            modified,
            deleted,
        }
    }

    /// Total number of changes across all four lists
    pub fn len(&self) -> usize {
        self.added.len() + self.renamed.len() + self.modified.len() + self.deleted.len()
    }

    /// True iff the snapshots were identical
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.added.is_empty() {
            writeln!(f, "Added files:")?;
            for add in &self.added {
                writeln!(f, "+ {} {}", hex::encode(&add.hash), add.path)?;
            }
            writeln!(f)?;
        }
        if !self.renamed.is_empty() {
            writeln!(f, "Renamed files:")?;
            for rename in &self.renamed {
                writeln!(
                    f,
                    "~ {} {} -> {}",
                    hex::encode(&rename.hash),
                    rename.old_path,
                    rename.new_path
                )?;
            }
            writeln!(f)?;
        }
        if !self.modified.is_empty() {
            writeln!(f, "Modified files:")?;
            for modify in &self.modified {
                writeln!(
                    f,
                    "! {} -> {} {}",
                    hex::encode(&modify.old_hash),
                    hex::encode(&modify.new_hash),
                    modify.path
                )?;
            }
            writeln!(f)?;
        }
        if !self.deleted.is_empty() {
            writeln!(f, "Deleted files:")?;
            for delete in &self.deleted {
                writeln!(f, "- {} {}", hex::encode(&delete.hash), delete.path)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
