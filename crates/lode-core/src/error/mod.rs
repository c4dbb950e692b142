//! Error types and result aliases for lode operations.
//!
//! Provides a unified error type that covers every failure the resolver,
//! the registry layer and the file adapters can report, each carrying
//! enough context to reproduce the decision point.

use thiserror::Error;

use crate::types::{ConflictReport, VersionError};

/// Unified error type for all lode operations
#[derive(Error, Debug)]
pub enum LodeError {
    // Configuration errors
    #[error("Registry configuration field '{field}' is invalid: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Failed to parse {file}: {message} at line {line}, column {column}")]
    TomlParse {
        file: String,
        message: String,
        line: usize,
        column: usize,
    },

    // Reference errors
    #[error("Unknown registry '{reference}'")]
    UnknownRegistry { reference: String },

    #[error("Registry reference '{reference}' is ambiguous: {candidates} registries match")]
    AmbiguousReference { reference: String, candidates: usize },

    // Document errors
    #[error("Invalid metadata at '{field}': {reason}")]
    InvalidMetadata { field: String, reason: String },

    #[error("Invalid manifest at '{field}': {reason}")]
    InvalidManifest { field: String, reason: String },

    #[error("Invalid requirement '{input}': {reason}")]
    InvalidRequirement { input: String, reason: String },

    #[error("Invalid version '{input}': {source}")]
    InvalidVersion {
        input: String,
        #[source]
        source: VersionError,
    },

    // Registry errors
    #[error("Package '{name}' not found on registry '{registry}'")]
    PackageNotFound { name: String, registry: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Registry '{registry}' returned an unusable response: {message}")]
    RegistryProtocol { registry: String, message: String },

    // Resolution errors
    #[error("Dependency resolution failed\n{report}")]
    Unresolvable { report: ConflictReport },

    #[error("Resolution cancelled: {reason}")]
    Cancelled { reason: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for lode operations
pub type LodeResult<T> = Result<T, LodeError>;

impl LodeError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a configuration error for a field
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a metadata error for a field path
    pub fn invalid_metadata(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a manifest error for a field path
    pub fn invalid_manifest(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LodeError::Network { .. } | LodeError::Io { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            LodeError::Configuration { .. } => {
                Some("Fix the entry in registries.toml or [tool.lode.registries]")
            },
            LodeError::UnknownRegistry { .. } => {
                Some("Run 'lode registries' to list the configured registries")
            },
            LodeError::AmbiguousReference { .. } => {
                Some("Give each registry a unique alias, or refer to it by URL or UUID")
            },
            LodeError::PackageNotFound { .. } => Some(
                "Check the package name, or bind it to another registry with --registry",
            ),
            LodeError::Network { .. } => Some("Check your internet connection and try again"),
            LodeError::Unresolvable { .. } => {
                Some("Relax one of the conflicting constraints listed above")
            },
            LodeError::Cancelled { .. } => {
                Some("Increase the timeout with --timeout or LODE_TIMEOUT_SECS")
            },
            LodeError::InvalidManifest { .. } => {
                Some("Delete pyproject.lock and run 'lode lock' to regenerate it")
            },
            _ => None,
        }
    }
}

impl From<VersionError> for LodeError {
    fn from(source: VersionError) -> Self {
        Self::InvalidVersion {
            input: source.input().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let io = LodeError::io(
            "read failed".to_string(),
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(io.is_recoverable());

        let missing = LodeError::PackageNotFound {
            name: "requests".to_string(),
            registry: "pypi".to_string(),
        };
        assert!(!missing.is_recoverable());
        assert!(missing.suggestion().is_some());
    }

    #[test]
    fn test_version_error_conversion() {
        let err: LodeError = "1.x".parse::<crate::types::Version>().unwrap_err().into();
        match err {
            LodeError::InvalidVersion { input, .. } => assert_eq!(input, "1.x"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
