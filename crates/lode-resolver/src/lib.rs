//! Dependency resolution engine for lode
//!
//! This crate turns a project's registry-bound requirements into a
//! resolution graph by backtracking version selection, and turns that graph
//! into a reproducible manifest. Registry queries go through a pass-local
//! cache, run concurrently across identities, and are bounded by a timeout
//! or a caller's cancellation signal.

pub mod engine;
pub mod graph;
pub mod lock;
pub mod options;

// Re-export main types
pub use engine::{ResolutionOutcome, Resolver};
pub use graph::{RequirementEdge, ResolutionGraph, ResolvedPackage};
pub use lock::{dependency_paths, project_digest, status, synthesize, validate};
pub use options::{cancellation, CancelHandle, CancelSignal, ResolveOptions};

use lode_core::error::LodeError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, LodeError>;
