//! Canonical JSON encoding for snapshot fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Object keys serialize in sorted order (`serde_json::Value` maps are ordered)
//! - Array order is preserved
//! - Numbers use serde_json's shortest round-trip formatting

use serde_json::Value;
use xxhash_rust::xxh64::xxh64;

/// Canonical JSON bytes of a value.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Canonical xxh64 hash of a value.
pub fn canonical_hash(value: &Value) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Canonical hash as a 16-digit hex string.
pub fn canonical_hash_hex(value: &Value) -> String {
    format!("{:016x}", canonical_hash(value))
}
