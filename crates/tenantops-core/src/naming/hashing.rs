//! Hash helpers for derived names.
//!
//! SHA-256 only. The digest feeds truncation suffixes, so the algorithm is
//! part of the naming scheme and must not change within a scheme version.

use sha2::{Digest, Sha256};

/// Hash raw bytes and return lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// First `len` hex characters of the SHA-256 digest (`len` ≤ 64).
pub fn short_hash_hex(bytes: &[u8], len: usize) -> String {
    let mut full = sha256_hex(bytes);
    full.truncate(len.min(64));
    full
}
