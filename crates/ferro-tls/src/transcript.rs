//! Running hash over the handshake transcript.
//!
//! The hash is always SHA-256 regardless of the negotiated suite, and covers
//! every handshake message byte in wire order — inbound and outbound alike —
//! with HelloRequest excluded.

use sha2::{Digest, Sha256};

/// Running SHA-256 over handshake bytes with non-destructive snapshots.
#[derive(Clone)]
pub struct TranscriptHash {
    hasher: Sha256,
}

impl TranscriptHash {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Feed handshake bytes into the transcript.
    pub fn absorb(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything absorbed so far, without finalizing the state.
    pub fn snapshot(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }
}

impl Default for TranscriptHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_empty_snapshot_is_sha256_of_nothing() {
        let th = TranscriptHash::new();
        assert_eq!(
            to_hex(&th.snapshot()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_snapshot_is_non_destructive() {
        let mut th = TranscriptHash::new();
        th.absorb(b"hello");
        let h1 = th.snapshot();
        let h2 = th.snapshot();
        assert_eq!(h1, h2);

        th.absorb(b" world");
        let h3 = th.snapshot();
        assert_ne!(h1, h3);
        assert_eq!(h3, <[u8; 32]>::from(Sha256::digest(b"hello world")));
    }

    #[test]
    fn test_chunking_is_equivalent() {
        let mut whole = TranscriptHash::new();
        whole.absorb(b"abcdef");

        let mut parts = TranscriptHash::new();
        for chunk in [b"ab".as_slice(), b"cd", b"ef"] {
            parts.absorb(chunk);
        }
        assert_eq!(whole.snapshot(), parts.snapshot());
    }
}
