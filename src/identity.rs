//! Content hashes used as cache identities and seed sources

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `text`.
pub fn digest_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Deterministic 64-bit seed derived from `text`.
pub fn derive_seed(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = digest_hex("simulator");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_hex("simulator"));
        assert_ne!(digest, digest_hex("simulator "));
    }

    #[test]
    fn test_seed_depends_on_text() {
        assert_eq!(derive_seed("a"), derive_seed("a"));
        assert_ne!(derive_seed("a"), derive_seed("b"));
    }
}
