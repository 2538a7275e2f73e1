//! Session token generation and comparison.
//!
//! A token is a 32-byte random value, hex-encoded, carried inside the QR code
//! a lecturer projects. Comparison goes through SHA-256 digests so the
//! equality check runs over fixed-length data in constant time.

use rand::RngCore;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Generates a fresh session token with 256 bits of entropy.
pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hasher.finalize().into()
}

/// Constant-time token comparison.
pub fn tokens_match(submitted: &str, current: &str) -> bool {
    let a = digest(submitted);
    let b = digest(current);
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tokens_match_ignores_surrounding_whitespace() {
        let token = generate_token();
        assert!(tokens_match(&format!("  {token} "), &token));
    }

    #[test]
    fn test_different_tokens_do_not_match() {
        assert!(!tokens_match(&generate_token(), &generate_token()));
    }
}
