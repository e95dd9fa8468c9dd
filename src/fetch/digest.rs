use sha2::{Digest, Sha256};

/// Computes the content digest used for change detection
///
/// SHA-256 over the UTF-8 bytes of `content`, hex-encoded (64 characters).
/// Empty content digests to the hash of the empty byte sequence.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
