//! Stable hashing for index keys and discriminators.
//!
//! Keys are persisted, so every hash here must be identical across runs,
//! processes and platforms. `std::hash` and `ahash` are not.

use xxhash_rust::xxh64::xxh64;

const KEY_SEED: u64 = 0;

/// 64-bit key for a word or property value.
pub fn hash_key(text: &str) -> u64 {
    xxh64(text.as_bytes(), KEY_SEED)
}

/// 64-bit key mixed with the text length, used for exact-match variants so
/// they never collide with the prefix variant of the same text.
pub fn hash_exact_key(text: &str) -> u64 {
    let len = text.chars().count() as u64;
    hash_key(text) ^ xxh64(&len.to_le_bytes(), KEY_SEED ^ 0x9e37_79b9_7f4a_7c15)
}

/// 32-bit discriminator for a property name.
pub fn hash_name(name: &str) -> i32 {
    crc32fast::hash(name.as_bytes()) as i32
}
