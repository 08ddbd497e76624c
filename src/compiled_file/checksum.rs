//! SHA3-256 body checksum written in the third header line.

use sha3::{Digest, Sha3_256};
use std::fmt;

/// Header value for files written without a checksum.
pub const UNCHECKED: &str = "x";

/// SHA3-256 digest length in bytes.
pub const CHECKSUM_LEN: usize = 32;

/// Digest of a marshalled body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub struct Checksum(pub [u8; CHECKSUM_LEN]);

impl Checksum {
    /// Hashes `body` in one shot.
    pub fn of(body: &[u8]) -> Self {
        let mut builder = ChecksumBuilder::new();
        builder.update(body);
        builder.finalize()
    }

    /// Whether `header` (lowercase hex or [`UNCHECKED`]) matches this digest.
    pub fn matches_header(&self, header: &str) -> bool {
        header == UNCHECKED || header.eq_ignore_ascii_case(&self.to_string())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental SHA3-256 builder.
#[derive(Default)]
pub struct ChecksumBuilder {
    hasher: Sha3_256,
}

impl ChecksumBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> Checksum {
        Checksum(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            Checksum::of(b"").to_string(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut builder = ChecksumBuilder::new();
        builder.update(b"M\x01");
        builder.update(b"nn");
        assert_eq!(builder.finalize(), Checksum::of(b"M\x01nn"));
    }

    #[test]
    fn header_matching() {
        let sum = Checksum::of(b"body");
        assert!(sum.matches_header(&sum.to_string()));
        assert!(sum.matches_header(&sum.to_string().to_uppercase()));
        assert!(sum.matches_header(UNCHECKED));
        assert!(!sum.matches_header(&Checksum::of(b"other").to_string()));
        assert_eq!(sum.to_string().len(), CHECKSUM_LEN * 2);
    }
}
