//! Container digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes the MD5 digest of the given data and returns it as a hex string.
pub fn md5_digest(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Identity digests recorded for every stored container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHashes {
    pub md5: String,
    pub sha256: String,
}

impl ContainerHashes {
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: md5_digest(data),
            sha256: sha256_digest(data),
        }
    }
}
