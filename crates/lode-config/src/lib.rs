//! Configuration and file adapters for lode
//!
//! This crate reads and edits the project metadata file, loads the layered
//! registry configuration into a `RegistryDirectory`, and reads and
//! atomically writes the manifest (lock) file.

pub mod document;
pub mod loader;
pub mod manifest;
pub mod metadata;
pub mod registries;

// Re-export main types
pub use loader::{ConfigLoader, Project, Settings};
pub use manifest::{parse_manifest, read_manifest, render_manifest, write_manifest, MANIFEST_FILE};
pub use metadata::{default_metadata, MetadataEditor, ProjectMetadata, RegistryOverride, METADATA_FILE};
pub use registries::{RegistriesFile, RegistryEntry, RegistrySettings, REGISTRIES_FILE};

use lode_core::error::LodeError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, LodeError>;
