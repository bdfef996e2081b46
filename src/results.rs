//! Canonical serialization of hash results and the summary hash
//!
//! [`HashResults`] owns the canonical byte form of one snapshot: one line
//! per file, `<lowercase hex digest> <relative path>\n`, sorted by relative
//! path in lexicographic byte order. That ordering is load-bearing: the
//! summary hash is the digest of these bytes, so it cannot depend on
//! discovery order. Two results are equal iff their serializations are
//! byte-identical.

use crate::algorithm::Algorithm;
use crate::error::{Result, TreesumError};
use indexmap::IndexMap;
use std::path::Path;
use tracing::trace;

/// An insertion-ordered relative path -> digest mapping
pub type PathHashMap = IndexMap<String, Vec<u8>>;

/// The immutable result of one hashing run (or a parsed previous export)
#[derive(Debug, Clone)]
pub struct HashResults {
    /// Algorithm that produced the digests
    pub algorithm: Algorithm,
    lines: Vec<u8>,
}

impl HashResults {
    /// Build results from path -> digest entries, already sorted by path
    pub fn from_sorted_entries<'a, I>(algorithm: Algorithm, entries: I) -> HashResults
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<u8>)>,
    {
        let mut lines = Vec::new();
        for (path, digest) in entries {
            lines.extend_from_slice(hex::encode(digest).as_bytes());
            lines.push(b' ');
            lines.extend_from_slice(path.as_bytes());
            lines.push(b'\n');
        }
        HashResults { algorithm, lines }
    }

    /// Wrap a previously exported serialization without validating it;
    /// validation happens lazily in [`HashResults::to_map`]
    pub fn from_bytes(algorithm: Algorithm, lines: Vec<u8>) -> HashResults {
        HashResults { algorithm, lines }
    }

    /// Read a previous export file
    pub fn read_file(algorithm: Algorithm, path: &Path) -> Result<HashResults> {
        let lines = std::fs::read(path).map_err(|source| TreesumError::ExportRead {
            path: path.to_path_buf(),
            source,
        })?;
        trace!("Read previous [export file]: {:?} ({} bytes)", path, lines.len());
        Ok(HashResults::from_bytes(algorithm, lines))
    }

    /// Write the canonical serialization to `path`
    pub fn export(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.lines).map_err(|source| TreesumError::ExportWrite {
            path: path.to_path_buf(),
            source,
        })?;
        trace!("Wrote to [export file]: {:?}", path);
        Ok(())
    }

    /// The canonical serialization bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.lines
    }

    /// Number of path entries
    pub fn len(&self) -> usize {
        let newlines = self.lines.iter().filter(|b| **b == b'\n').count();
        // a corrupted export may be missing the final newline; the last
        // line still counts
        if self.lines.last().is_some_and(|b| *b != b'\n') {
            newlines + 1
        } else {
            newlines
        }
    }

    /// True when there are no entries at all
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The single summary hash of the whole snapshot: a digest of the
    /// canonical serialization with the same algorithm
    pub fn total_hash(&self) -> Vec<u8> {
        let hash = self.algorithm.digest(&self.lines);
        trace!("Calculated total hash: {}", hex::encode(&hash));
        hash
    }

    /// Parse the serialization back into an ordered path -> digest mapping.
    ///
    /// Rejects, with the 1-based line number: a digest that is not exactly
    /// `2 * digest_len` lowercase hex characters, a missing separator
    /// space, an invalid UTF-8 or empty path, and duplicate paths. A
    /// missing final newline is tolerated so that a truncated export still
    /// reports the real mismatch instead of losing its last line.
    pub fn to_map(&self) -> Result<PathHashMap> {
        let hex_len = self.algorithm.digest_len() * 2;
        let mut map = PathHashMap::new();

        for (index, line) in self.lines.split(|b| *b == b'\n').enumerate() {
            if line.is_empty() {
                continue; // the final newline produces one empty slice
            }
            let number = index + 1;
            let display = String::from_utf8_lossy(line).into_owned();

            // only the digest length is guarded here; a missing separator
            // or empty path gets its own error below
            if line.len() <= hex_len {
                return Err(parse_error(number, format!("line is too short: {display}")));
            }
            let (hex_part, rest) = line.split_at(hex_len);
            if !hex_part.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)) {
                return Err(parse_error(
                    number,
                    format!("digest is not lowercase hex: {display}"),
                ));
            }
            let digest = hex::decode(hex_part)
                .map_err(|e| parse_error(number, format!("{e}: {display}")))?;
            if rest.first() != Some(&b' ') {
                return Err(parse_error(
                    number,
                    format!("could not split hash from path: {display}"),
                ));
            }
            let path = std::str::from_utf8(&rest[1..]).map_err(|_| {
                parse_error(number, format!("could not decode path using UTF-8: {display}"))
            })?;
            if path.is_empty() {
                return Err(parse_error(number, format!("path was empty: {display}")));
            }
            if map.insert(path.to_string(), digest).is_some() {
                return Err(parse_error(
                    number,
                    format!("at least two export lines found with identical paths '{path}'"),
                ));
            }
        }
        Ok(map)
    }
}

fn parse_error(line: usize, message: String) -> TreesumError {
    TreesumError::ExportParse { line, message }
}

impl PartialEq for HashResults {
    fn eq(&self, other: &Self) -> bool {
        self.lines == other.lines
    }
}

impl Eq for HashResults {}
