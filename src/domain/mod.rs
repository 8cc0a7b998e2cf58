//! Domain models for the settlement core.
//!
//! Proof records with their append-only event history, the derived status
//! fold, and the settlement-side records the worker maintains.

mod proof;
mod settlement;
mod types;

pub use proof::*;
pub use settlement::*;
pub use types::*;
