//! Core data types for lode.
//!
//! This module provides the fundamental types used throughout the workspace:
//! - Version numbers and constraint expressions
//! - Registries and registry references
//! - Registry-scoped package identities and requirements
//! - The manifest and conflict report produced by resolution

pub mod conflict;
pub mod constraint;
pub mod identity;
pub mod manifest;
pub mod project;
pub mod registry;
pub mod requirement;
pub mod version;

// Re-export all public types
pub use conflict::{ConflictClause, ConflictReport, ConstraintOrigin};
pub use constraint::{Comparator, Op, VersionConstraint};
pub use identity::PackageIdentity;
pub use manifest::{Freshness, Manifest, ManifestEntry, MANIFEST_FORMAT_VERSION};
pub use project::ProjectType;
pub use registry::{
    normalize_url, Registry, RegistryLookup, RegistryRef, DEFAULT_REGISTRY_ALIAS,
    DEFAULT_REGISTRY_URL,
};
pub use requirement::{Origin, Requirement, RequirementSpec};
pub use version::{PreKind, PreRelease, Version, VersionError};
