//! One-way hashing of prompt text and end-user identifiers
//!
//! Raw prompts and user ids are hashed as soon as they are read from a
//! request and the raw strings are dropped. Only the digest ever reaches
//! storage, logs or metrics.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_LEN: usize = 64;

/// Hash a raw identifier (prompt text or user id)
pub fn hash_identifier(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a string has the shape of a stored hash
pub fn is_hash(value: &str) -> bool {
    value.len() == HASH_LEN
        && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Byte comparison whose running time does not depend on where inputs differ
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Compare a presented secret against the configured one. Both sides are
/// digested first so the comparison length is fixed.
pub fn secret_matches(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    constant_time_eq(&presented, &expected)
}

/// Hashed prompt/user pair produced from raw request fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashedIdentity {
    pub prompt_hash: Option<String>,
    pub user_hash: Option<String>,
}

impl HashedIdentity {
    /// Consume raw values, keeping only their digests.
    /// Blank values count as absent.
    pub fn from_raw(prompt: Option<String>, user_id: Option<String>) -> Self {
        Self {
            prompt_hash: hash_non_blank(prompt),
            user_hash: hash_non_blank(user_id),
        }
    }
}

fn hash_non_blank(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| hash_identifier(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_and_fixed_length() {
        let a = hash_identifier("Write me a haiku about Rust");
        let b = hash_identifier("Write me a haiku about Rust");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_LEN);
        assert!(is_hash(&a));
        assert_ne!(a, hash_identifier("Write me a haiku about Go"));
    }

    #[test]
    fn test_hash_does_not_contain_input() {
        let raw = "user-42@example.com";
        let digest = hash_identifier(raw);
        assert!(!digest.contains("user-42"));
    }

    #[test]
    fn test_from_raw_hashes_both_fields_with_same_function() {
        let identity = HashedIdentity::from_raw(Some("hello".into()), Some("hello".into()));
        assert_eq!(identity.prompt_hash, identity.user_hash);
        assert_eq!(identity.prompt_hash.as_deref(), Some(hash_identifier("hello").as_str()));
    }

    #[test]
    fn test_from_raw_skips_absent_and_blank() {
        let identity = HashedIdentity::from_raw(None, Some("   ".into()));
        assert_eq!(identity, HashedIdentity::default());
    }

    #[test]
    fn test_secret_comparison() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"abc", b"abcd"));

        assert!(secret_matches("ops-secret", "ops-secret"));
        assert!(!secret_matches("ops-secre", "ops-secret"));
        assert!(!secret_matches("", "ops-secret"));
    }

    #[test]
    fn test_is_hash_rejects_other_shapes() {
        assert!(!is_hash("abc"));
        assert!(!is_hash(&"A".repeat(HASH_LEN)));
        assert!(!is_hash(&"g".repeat(HASH_LEN)));
        assert!(is_hash(&"0".repeat(HASH_LEN)));
    }
}
