//! The registry query capability.

use std::future::Future;
use std::pin::Pin;

use lode_core::types::{Registry, RequirementSpec, Version};
use lode_core::LodeResult;

use crate::RegistryResult;

/// Boxed future returned by registry queries
pub type QueryFuture<'a, T> = Pin<Box<dyn Future<Output = RegistryResult<T>> + Send + 'a>>;

/// A dependency as a distribution declares it, before registry binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub spec: RequirementSpec,
    /// Extra group this dependency belongs to, from an `extra == "..."` marker
    pub extra: Option<String>,
}

impl DeclaredDependency {
    pub fn new(spec: RequirementSpec) -> Self {
        let extra = spec.extra_group();
        Self { spec, extra }
    }

    /// Parse a `Requires-Dist` style requirement string
    pub fn parse(input: &str) -> LodeResult<Self> {
        Ok(Self::new(RequirementSpec::parse(input)?))
    }

    /// Check if this dependency is always installed
    pub fn is_unconditional(&self) -> bool {
        self.extra.is_none()
    }
}

/// What the resolver needs to know about a registry.
///
/// Implementations own transport concerns (retries, authentication). A
/// query either succeeds with a result or fails terminally.
pub trait RegistryQuery: Send + Sync {
    /// Every published version of a package; empty when none exist
    fn list_versions<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
    ) -> QueryFuture<'a, Vec<Version>>;

    /// Dependencies declared by one version
    fn fetch_dependencies<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, Vec<DeclaredDependency>>;

    /// `sha256:<hex>` of the version's preferred distribution
    fn content_hash<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, String>;
}
