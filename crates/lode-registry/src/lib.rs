//! Registry access for lode
//!
//! This crate provides the capability the resolver consumes to ask a registry
//! which versions of a package exist, what a version depends on and what
//! its distribution hashes to. It ships an HTTP client for the JSON simple
//! index, an in-memory catalog for tests and offline snapshots, and the
//! per-pass query cache.

pub mod api;
pub mod cache;
pub mod client;
pub mod memory;
pub mod query;

// Re-export main types
pub use api::{CoreMetadata, DistributionFile, ProjectPage, Yanked};
pub use cache::{CacheStats, CachedRegistry, QueryCache};
pub use client::{ClientConfig, RetryConfig, SimpleIndexClient};
pub use memory::{MemoryRegistry, Snapshot};
pub use query::{DeclaredDependency, QueryFuture, RegistryQuery};

use lode_core::error::LodeError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, LodeError>;
