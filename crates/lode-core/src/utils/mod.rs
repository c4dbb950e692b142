//! Utility functions and helpers.
//!
//! Common functionality used across multiple lode crates.

pub mod hash;
pub mod name;

// Re-export commonly used utilities
pub use hash::{sha256_digest, Digest};
pub use name::{is_valid_name, normalize_name};
