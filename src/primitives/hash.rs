//! Truncated SHA-256 fingerprinting for cache keys and API-key verification.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the full 64-character SHA-256 digest.
///
/// 16 hex chars (64 bits) is enough to make collisions practically
/// irrelevant for cache keys and log correlation, while keeping fingerprints
/// short in traces and error messages.
const TRUNCATED_HEX_LEN: usize = 16;

/// Hash `input` with SHA-256 and return the first [`TRUNCATED_HEX_LEN`] hex
/// characters of the digest. Not suitable for anything requiring collision
/// resistance at full strength -- use [`full_sha256_hex`] for that.
pub fn truncated_sha256_hex(input: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(input.as_ref());
    let hex = hex_encode(&digest);
    hex[..TRUNCATED_HEX_LEN].to_string()
}

/// Full 64-character hex-encoded SHA-256 digest, used for API-key hash
/// storage where full collision resistance matters.
pub fn full_sha256_hex(input: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(input.as_ref());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}

/// Constant-time comparison of two hex digest strings, used to verify
/// API keys without leaking timing information about where they diverge.
pub fn constant_time_eq_hex(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
