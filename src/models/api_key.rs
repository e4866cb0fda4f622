//! API key generation and hashing.
//!
//! API keys authenticate users making requests to the API. They are stored in
//! the database as SHA-256 hashes; the raw key is only shown once.

use sha2::{Digest, Sha256};

/// Prefix that makes leaked keys easy to recognise.
pub const API_KEY_PREFIX: &str = "sk_";

/// Generate a new random API key (`sk_` + 64 hex characters).
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

/// Hash a raw API key for storage and lookup.
pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();

        assert!(a.starts_with(API_KEY_PREFIX));
        assert_eq!(a.len(), API_KEY_PREFIX.len() + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_sha256_hex() {
        // sha256("abc")
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
