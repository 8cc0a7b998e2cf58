//! Deterministic hashing with domain separation.
//!
//! Evidence payloads are hashed over their RFC 8785 canonical JSON form
//! (via `serde_json_canonicalizer`) so the fingerprint is stable across
//! key order, whitespace, and number formatting. All hashes carry a
//! domain-separation prefix.

use sha2::{Digest, Sha256};

use crate::domain::Hash256;

/// Domain prefix for mission evidence hashing
pub const DOMAIN_EVIDENCE: &[u8] = b"QUESTLINE_EVIDENCE_V1";

/// Domain prefix for the settlement trigger secret
pub const DOMAIN_TRIGGER_SECRET: &[u8] = b"QUESTLINE_TRIGGER_SECRET_V1";

/// Convert JSON value to canonical string representation per RFC 8785 (JCS).
///
/// Keys sorted lexicographically by UTF-8 bytes, no extra whitespace,
/// ES6-normalized numbers.
///
/// # Panics
///
/// Panics if the JSON value contains a float that cannot be represented
/// (NaN or Infinity). Per RFC 8785, these are not valid JSON, and
/// `serde_json::Value` built from parsed JSON can never hold them.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    serde_json_canonicalizer::to_string(value)
        .expect("Failed to canonicalize JSON - contains invalid values (NaN or Infinity)")
}

/// Fingerprint of an evidence payload.
///
/// evidence_hash = SHA256(b"QUESTLINE_EVIDENCE_V1" || JCS(evidence))
pub fn evidence_hash(value: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(value);

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_EVIDENCE);
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Hash raw bytes with SHA-256 (no domain prefix)
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex digest of a trigger secret, domain-prefixed.
///
/// Stored at configuration time and compared against the hash of the
/// presented secret, so the secret itself never sits in memory longer
/// than the comparison.
pub fn trigger_secret_hash(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TRIGGER_SECRET);
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
