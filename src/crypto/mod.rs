//! Hashing utilities for the settlement core.
//!
//! Canonical JSON evidence fingerprints and the trigger-secret digest.
//! Wallet signature verification is deliberately NOT here: it lives
//! behind the `SignatureVerifier` seam and is supplied by the caller.

mod hash;

pub use hash::*;
