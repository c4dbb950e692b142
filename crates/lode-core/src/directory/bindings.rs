//! Package name to registry bindings.
//!
//! A project maps selected package names to registries; every other name,
//! direct or transitive, binds to the directory's default registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::RegistryDirectory;
use crate::error::LodeResult;
use crate::types::{PackageIdentity, Registry, RegistryRef};
use crate::utils::normalize_name;

/// Registry (and optional package UUID) a name is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub registry: Arc<Registry>,
    pub uuid: Option<Uuid>,
}

/// Resolved registry overrides for one project
#[derive(Debug, Clone)]
pub struct RegistryBindings {
    default: Arc<Registry>,
    overrides: BTreeMap<String, Binding>,
}

impl RegistryBindings {
    /// Bindings with no overrides
    pub fn new(directory: &RegistryDirectory) -> Self {
        Self {
            default: directory.default_registry(),
            overrides: BTreeMap::new(),
        }
    }

    /// Bind a package name to a registry reference, resolving it now
    pub fn bind(
        &mut self,
        directory: &RegistryDirectory,
        name: &str,
        reference: &RegistryRef,
        uuid: Option<Uuid>,
    ) -> LodeResult<()> {
        let registry = directory.resolve(reference)?;
        // Validates the name before it becomes a key
        PackageIdentity::new(name, Arc::clone(&registry))?;
        self.overrides
            .insert(normalize_name(name), Binding { registry, uuid });
        Ok(())
    }

    /// Identity a package name refers to in this project
    pub fn identity(&self, name: &str) -> LodeResult<PackageIdentity> {
        match self.overrides.get(&normalize_name(name)) {
            Some(binding) => Ok(PackageIdentity::new(name, Arc::clone(&binding.registry))?
                .with_uuid(binding.uuid)),
            None => PackageIdentity::new(name, Arc::clone(&self.default)),
        }
    }

    /// Override for a name, if any
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.overrides.get(&normalize_name(name))
    }

    /// All overrides keyed by normalized name
    pub fn overrides(&self) -> &BTreeMap<String, Binding> {
        &self.overrides
    }

    pub fn default_registry(&self) -> &Arc<Registry> {
        &self.default
    }
}
