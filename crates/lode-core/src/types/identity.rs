//! Registry-scoped package identity.
//!
//! Two identities are the same package iff both carry the same UUID, or
//! neither carries a UUID and their normalized name and registry match.
//! A name alone never identifies a package.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

use super::registry::{Registry, RegistryRef};
use crate::directory::RegistryDirectory;
use crate::error::{LodeError, LodeResult};
use crate::utils::{is_valid_name, normalize_name};

/// Identity of a package within a registry
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    name: String,
    registry: Arc<Registry>,
    uuid: Option<Uuid>,
}

impl PackageIdentity {
    /// Create an identity bound to an already resolved registry
    pub fn new(name: &str, registry: Arc<Registry>) -> LodeResult<Self> {
        if !is_valid_name(name.trim()) {
            return Err(LodeError::InvalidRequirement {
                input: name.to_string(),
                reason: "package names are ASCII letters, digits, '-', '_' and '.'".to_string(),
            });
        }
        Ok(Self {
            name: normalize_name(name),
            registry,
            uuid: None,
        })
    }

    /// Create an identity, resolving the registry reference first
    pub fn resolve(
        name: &str,
        reference: &RegistryRef,
        directory: &RegistryDirectory,
    ) -> LodeResult<Self> {
        let registry = directory.resolve(reference)?;
        Self::new(name, registry)
    }

    /// Attach a package UUID
    pub fn with_uuid(mut self, uuid: Option<Uuid>) -> Self {
        self.uuid = uuid;
        self
    }

    /// Normalized package name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry this identity is bound to
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared handle to the registry
    pub fn registry_handle(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Package UUID, when known
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Stable ordering key: name, registry alias, registry URL, UUID
    pub fn sort_key(&self) -> (&str, &str, &str, Option<Uuid>) {
        (&self.name, &self.registry.alias, &self.registry.url, self.uuid)
    }

    /// `name@alias`, for short diagnostics
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.registry.alias)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        match (self.uuid, other.uuid) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name && self.registry == other.registry,
            _ => false,
        }
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.uuid {
            Some(uuid) => {
                0u8.hash(state);
                uuid.hash(state);
            },
            None => {
                1u8.hash(state);
                self.name.hash(state);
                self.registry.hash(state);
            },
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.registry.alias)?;
        if let Some(uuid) = self.uuid {
            write!(f, " ({})", uuid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pypi() -> Arc<Registry> {
        Arc::new(Registry::default_index())
    }

    fn corp() -> Arc<Registry> {
        Arc::new(Registry::new("corp", "https://corp.example/simple"))
    }

    #[test]
    fn test_same_name_different_registry_is_different_package() {
        let public = PackageIdentity::new("utils", pypi()).unwrap();
        let private = PackageIdentity::new("utils", corp()).unwrap();
        assert_ne!(public, private);

        let set: HashSet<_> = [public, private].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_names_are_normalized() {
        let a = PackageIdentity::new("Zope.Interface", pypi()).unwrap();
        let b = PackageIdentity::new("zope_interface", pypi()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name(), "zope-interface");
    }

    #[test]
    fn test_uuid_identity_spans_registries() {
        let uuid = Uuid::new_v4();
        let a = PackageIdentity::new("utils", pypi()).unwrap().with_uuid(Some(uuid));
        let b = PackageIdentity::new("utils-renamed", corp()).unwrap().with_uuid(Some(uuid));
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_uuid_on_one_side_only_never_matches() {
        let with = PackageIdentity::new("utils", pypi())
            .unwrap()
            .with_uuid(Some(Uuid::new_v4()));
        let without = PackageIdentity::new("utils", pypi()).unwrap();
        assert_ne!(with, without);
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(PackageIdentity::new("", pypi()).is_err());
        assert!(PackageIdentity::new("bad name", pypi()).is_err());
    }

    #[test]
    fn test_resolve_with_unknown_registry_fails() {
        let directory = RegistryDirectory::with_defaults();
        let err = PackageIdentity::resolve("utils", &RegistryRef::Alias("nope".into()), &directory)
            .unwrap_err();
        assert!(matches!(err, LodeError::UnknownRegistry { .. }));
    }
}
