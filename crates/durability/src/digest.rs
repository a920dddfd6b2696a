//! Payload digest strategies.
//!
//! Every payload carries one digest computed over its kind tag and bytes.
//! The algorithm is a swappable strategy chosen by name in configuration.
//!
//! | Name     | Algorithm   | Width    |
//! |----------|-------------|----------|
//! | `crc32`  | CRC32       | 4 bytes  |
//! | `xxh3`   | XXH3-128    | 16 bytes |
//! | `sha256` | SHA-256     | 32 bytes |

use sha2::Digest as _;
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Name of the default digest algorithm.
pub const DEFAULT_DIGEST: &str = "xxh3";

/// Digest bytes produced by a [`DigestAlgorithm`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Digest(bytes.into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Digest width in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the digest is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Integrity digest strategy.
///
/// `parts` are hashed as if concatenated, so callers can digest a header
/// and a body without copying them together.
pub trait DigestAlgorithm: Send + Sync + fmt::Debug {
    /// Stable identifier used in configuration.
    fn name(&self) -> &'static str;

    /// Digest the concatenation of `parts`.
    fn digest(&self, parts: &[&[u8]]) -> Digest;
}

/// CRC32 (IEEE), the same checksum `FileLogStream` records carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Digest;

impl DigestAlgorithm for Crc32Digest {
    fn name(&self) -> &'static str {
        "crc32"
    }

    fn digest(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = crc32fast::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Digest(hasher.finalize().to_le_bytes().to_vec())
    }
}

/// 128-bit XXH3. Default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Digest;

impl DigestAlgorithm for Xxh3Digest {
    fn name(&self) -> &'static str {
        "xxh3"
    }

    fn digest(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = Xxh3::new();
        for part in parts {
            hasher.update(part);
        }
        Digest(hasher.digest128().to_le_bytes().to_vec())
    }
}

/// SHA-256, for deployments that want a cryptographic digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl DigestAlgorithm for Sha256Digest {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = sha2::Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Digest(hasher.finalize().to_vec())
    }
}

/// Unknown digest name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown digest algorithm: {0}")]
pub struct UnknownDigestError(pub String);

/// Look up a digest algorithm by its configuration name.
pub fn digest_by_name(name: &str) -> Result<Arc<dyn DigestAlgorithm>, UnknownDigestError> {
    match name {
        "crc32" => Ok(Arc::new(Crc32Digest)),
        "xxh3" => Ok(Arc::new(Xxh3Digest)),
        "sha256" => Ok(Arc::new(Sha256Digest)),
        other => Err(UnknownDigestError(other.to_string())),
    }
}
