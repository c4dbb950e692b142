//! Manifest (lock) data model.
//!
//! The manifest is the only durable output of a resolution: every selected
//! package pinned to a version, a registry and a content hash, together
//! with who required it.

use std::collections::HashMap;
use std::fmt;

use super::identity::PackageIdentity;
use super::version::Version;
use crate::utils::normalize_name;

/// Format version written into `manifest.version`
pub const MANIFEST_FORMAT_VERSION: &str = "1";

/// A persisted resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Tool that produced the manifest, e.g. `lode 0.1.0`
    pub tool_version: String,
    /// Interpreter requirement the resolution was made for
    pub python_version: String,
    /// Digest of the project's requirement set
    pub project_hash: String,
    /// Entries in `(name, registry alias)` order
    pub dependencies: Vec<ManifestEntry>,
}

/// One pinned package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub identity: PackageIdentity,
    pub version: Version,
    pub content_hash: String,
    /// Declared by the project itself
    pub direct: bool,
    /// Packages that depend on this one, in identity order
    pub required_by: Vec<PackageIdentity>,
}

/// Result of comparing a manifest with the current metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Manifest {
    /// Look up the entry for an identity
    pub fn entry(&self, identity: &PackageIdentity) -> Option<&ManifestEntry> {
        self.dependencies.iter().find(|entry| entry.identity == *identity)
    }

    /// Entries whose package name matches, on any registry
    pub fn entries_named(&self, name: &str) -> Vec<&ManifestEntry> {
        let normalized = normalize_name(name);
        self.dependencies
            .iter()
            .filter(|entry| entry.identity.name() == normalized)
            .collect()
    }

    /// Pinned versions keyed by identity
    pub fn locked_versions(&self) -> HashMap<PackageIdentity, Version> {
        self.dependencies
            .iter()
            .map(|entry| (entry.identity.clone(), entry.version.clone()))
            .collect()
    }

    /// Number of pinned packages
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Check if nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
        }
    }
}
