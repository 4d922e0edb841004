//! Content hashes recorded for every stored asset.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash algorithm recorded on stored assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, kept for clients that still verify it.
    Md5,
    /// SHA-1, the algorithm Composer uses for `dist.shasum`.
    Sha1,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Every algorithm, in the order they are reported.
    pub const ALL: [Self; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    /// Algorithm name as used in attribute maps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Hex digest of `data`.
    #[must_use]
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(md5::Md5::digest(data)),
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hex digests of one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    /// MD5 digest.
    pub md5: String,
    /// SHA-1 digest.
    pub sha1: String,
    /// SHA-256 digest.
    pub sha256: String,
}

impl Hashes {
    /// Compute all digests of `data`.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: HashAlgorithm::Md5.digest_hex(data),
            sha1: HashAlgorithm::Sha1.digest_hex(data),
            sha256: HashAlgorithm::Sha256.digest_hex(data),
        }
    }

    /// Digest for one algorithm.
    #[must_use]
    pub fn get(&self, algorithm: HashAlgorithm) -> &str {
        match algorithm {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        let hashes = Hashes::compute(b"abc");
        assert_eq!(hashes.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hashes.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hashes.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn lookup_by_algorithm() {
        let hashes = Hashes::compute(b"");
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(hashes.get(algorithm), algorithm.digest_hex(b""));
        }
    }
}
