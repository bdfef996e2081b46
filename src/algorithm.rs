//! Digest algorithm selection and context creation
//!
//! An [`Algorithm`] wraps one of the supported cryptographic digests and
//! hands out fresh streaming contexts. The synthetic `GIT` algorithm is
//! SHA-1 with a `"blob <length>\0"` header absorbed before any file bytes,
//! which makes its output identical to Git's blob object IDs.
//!
//! Algorithm names are resolved once, eagerly, at configuration time; a bad
//! name can never surface mid-hash.

use crate::error::{Result, TreesumError};
use digest::{Digest, DynDigest};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

/// A streaming digest context, owned by exactly one worker at a time
pub type DigestContext = Box<dyn DynDigest + Send>;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// SHA-1 with Git's blob envelope, compatible with `git hash-object`
    Git,
    /// SHA-1, 20 byte digests
    Sha1,
    /// SHA-256, 32 byte digests
    Sha256,
    /// SHA-384, 48 byte digests
    Sha384,
    /// SHA-512, 64 byte digests
    Sha512,
    /// MD5, 16 byte digests
    Md5,
}

/// Canonical names of all supported algorithms, in help-text order
pub const SUPPORTED_ALGORITHMS: &[&str] = &["GIT", "MD5", "SHA-1", "SHA-256", "SHA-384", "SHA-512"];

impl Algorithm {
    /// Canonical name of this algorithm
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Git => "GIT",
            Algorithm::Sha1 => "SHA-1",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha384 => "SHA-384",
            Algorithm::Sha512 => "SHA-512",
            Algorithm::Md5 => "MD5",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Algorithm::Git | Algorithm::Sha1 => 20,
            Algorithm::Sha256 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 => 64,
            Algorithm::Md5 => 16,
        }
    }

    /// Create a fresh, reset digest context, pre-seeded with the Git blob
    /// envelope when applicable.
    ///
    /// `expected_len` is the exact number of content bytes that will be fed
    /// into the context; it is only consulted by [`Algorithm::Git`].
    pub fn new_context(&self, expected_len: u64) -> DigestContext {
        let mut ctx: DigestContext = match self {
            Algorithm::Git | Algorithm::Sha1 => Box::new(Sha1::new()),
            Algorithm::Sha256 => Box::new(Sha256::new()),
            Algorithm::Sha384 => Box::new(Sha384::new()),
            Algorithm::Sha512 => Box::new(Sha512::new()),
            Algorithm::Md5 => Box::new(Md5::new()),
        };
        self.seed_envelope(&mut ctx, expected_len);
        ctx
    }

    /// Re-arm an existing context for a new payload of `expected_len` bytes.
    ///
    /// Resets the underlying digest and absorbs the envelope again, so a
    /// worker can reuse one context across many files.
    pub fn reseed_context(&self, ctx: &mut DigestContext, expected_len: u64) {
        ctx.reset();
        self.seed_envelope(ctx, expected_len);
    }

    fn seed_envelope(&self, ctx: &mut DigestContext, expected_len: u64) {
        if let Algorithm::Git = self {
            let header = format!("blob {expected_len}\0");
            ctx.update(header.as_bytes());
        }
    }

    /// Digest an in-memory byte slice in one shot
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut ctx = self.new_context(data.len() as u64);
        ctx.update(data);
        ctx.finalize_reset().into_vec()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = TreesumError;

    /// Resolve an algorithm name, accepting dashless aliases such as `SHA1`
    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GIT" => Ok(Algorithm::Git),
            "SHA-1" | "SHA1" => Ok(Algorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(Algorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(Algorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(Algorithm::Sha512),
            "MD5" => Ok(Algorithm::Md5),
            _ => Err(TreesumError::UnsupportedAlgorithm {
                name: value.to_string(),
                supported: SUPPORTED_ALGORITHMS.join(", "),
            }),
        }
    }
}
