//! SHA-256 digest utilities.
//!
//! Digests are rendered as `sha256:<hex>` so the algorithm travels with
//! the value in manifests and registry responses.

use sha2::{Digest as _, Sha256};

/// Incremental digest over newline-terminated records
#[derive(Default, Clone)]
pub struct Digest {
    hasher: Sha256,
}

impl Digest {
    /// Create an empty digest
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record
    pub fn record(&mut self, line: &str) -> &mut Self {
        self.hasher.update(line.as_bytes());
        self.hasher.update(b"\n");
        self
    }

    /// Finish and render as `sha256:<hex>`
    pub fn finish(self) -> String {
        format!("sha256:{}", hex::encode(self.hasher.finalize()))
    }
}

/// Compute the `sha256:<hex>` digest of data
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest() {
        let digest = sha256_digest(b"hello world");
        assert_eq!(
            digest,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_record_digest_is_order_sensitive() {
        let mut first = Digest::new();
        first.record("a").record("b");
        let mut second = Digest::new();
        second.record("b").record("a");
        assert_ne!(first.finish(), second.finish());
    }

    #[test]
    fn test_record_boundaries_matter() {
        let mut joined = Digest::new();
        joined.record("ab");
        let mut split = Digest::new();
        split.record("a").record("b");
        assert_ne!(joined.finish(), split.finish());
    }
}
