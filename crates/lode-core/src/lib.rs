//! # lode-core
//!
//! Core types and utilities shared across all lode crates.
//!
//! This crate provides:
//! - `Version` and `VersionConstraint` types with PEP 440 ordering
//! - `Registry`, `RegistryRef` and the `RegistryDirectory` that resolves them
//! - `PackageIdentity` and `Requirement`, the registry-scoped dependency model
//! - The `Manifest` data type produced by resolution
//! - `LodeError` enum for unified error handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, PackageIdentity, Requirement, etc.)
//! - `directory`: Registry reference resolution
//! - `error`: Error types and result aliases
//! - `utils`: Name normalization and digest helpers

pub mod directory;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use directory::{Binding, RegistryBindings, RegistryDirectory};
pub use error::{LodeError, LodeResult};
pub use types::{
    ConflictClause, ConflictReport, ConstraintOrigin, Freshness, Manifest, ManifestEntry, Origin,
    PackageIdentity, ProjectType, Registry, RegistryLookup, RegistryRef, Requirement,
    RequirementSpec, Version, VersionConstraint,
};
