//! Registry directory.
//!
//! Holds the canonical, immutable set of configured registries and resolves
//! references to them. Everything else in the workspace borrows registries
//! from here as `Arc<Registry>` handles.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LodeError, LodeResult};
use crate::types::{normalize_url, Registry, RegistryLookup, RegistryRef};

mod bindings;

pub use bindings::{Binding, RegistryBindings};

#[cfg(test)]
mod tests;

/// The configured registries, loaded once per process
#[derive(Debug, Clone)]
pub struct RegistryDirectory {
    registries: Vec<Arc<Registry>>,
    default: Arc<Registry>,
}

impl RegistryDirectory {
    /// Build a directory from configured registries.
    ///
    /// Fails with `Configuration` for an empty alias, an unparseable URL,
    /// a UUID shared by two registries, or a default alias that names no
    /// registry. Duplicate aliases are accepted here and reported as
    /// ambiguous on lookup.
    pub fn new(registries: Vec<Registry>, default_alias: &str) -> LodeResult<Self> {
        let mut validated: Vec<Arc<Registry>> = Vec::with_capacity(registries.len());

        for (index, mut registry) in registries.into_iter().enumerate() {
            let alias = registry.alias.trim().to_string();
            if alias.is_empty() {
                return Err(LodeError::configuration(
                    format!("registries[{}].alias", index),
                    "alias must not be empty",
                ));
            }

            let parsed = url::Url::parse(registry.url.trim()).map_err(|e| {
                LodeError::configuration(
                    format!("registries[{}].url", index),
                    format!("'{}' is not a valid URL: {}", registry.url, e),
                )
            })?;

            if let Some(uuid) = registry.uuid {
                if validated.iter().any(|existing| existing.uuid == Some(uuid)) {
                    return Err(LodeError::configuration(
                        format!("registries[{}].uuid", index),
                        format!("UUID {} is used by more than one registry", uuid),
                    ));
                }
            }

            registry.alias = alias;
            registry.url = normalize_url(parsed.as_str());
            validated.push(Arc::new(registry));
        }

        let default = validated
            .iter()
            .find(|registry| registry.alias == default_alias)
            .cloned()
            .ok_or_else(|| {
                LodeError::configuration(
                    "default",
                    format!("default registry '{}' is not configured", default_alias),
                )
            })?;

        debug!(
            "Registry directory: {} registries, default '{}'",
            validated.len(),
            default.alias
        );

        Ok(Self {
            registries: validated,
            default,
        })
    }

    /// Directory containing only the public default registry
    pub fn with_defaults() -> Self {
        let default = Arc::new(Registry::default_index());
        Self {
            registries: vec![Arc::clone(&default)],
            default,
        }
    }

    /// Look up a registry by any combination of UUID, URL and alias.
    ///
    /// Keys are consulted in the order UUID, URL, alias; the first key that
    /// matches a registry decides. The chosen registry must not contradict
    /// any other key that was supplied.
    pub fn lookup(&self, lookup: &RegistryLookup) -> LodeResult<Arc<Registry>> {
        if lookup.is_empty() {
            return Err(LodeError::configuration(
                "registry",
                "a registry reference needs an alias, URL or UUID",
            ));
        }

        let url = lookup.url.as_deref().map(normalize_url);

        let by_uuid = lookup.uuid.map(|uuid| self.matching(|r| r.uuid == Some(uuid)));
        let by_url = url.as_deref().map(|url| self.matching(|r| r.url == url));
        let by_alias = lookup
            .alias
            .as_deref()
            .map(|alias| self.matching(|r| r.alias == alias));

        for candidates in [by_uuid, by_url, by_alias].into_iter().flatten() {
            match candidates.len() {
                0 => continue,
                1 => {
                    let registry = Arc::clone(&candidates[0]);
                    self.check_consistent(&registry, lookup, url.as_deref())?;
                    return Ok(registry);
                },
                n => {
                    return Err(LodeError::AmbiguousReference {
                        reference: lookup.describe(),
                        candidates: n,
                    })
                },
            }
        }

        Err(LodeError::UnknownRegistry {
            reference: lookup.describe(),
        })
    }

    /// Resolve a single-key reference
    pub fn resolve(&self, reference: &RegistryRef) -> LodeResult<Arc<Registry>> {
        self.lookup(&reference.to_lookup())
    }

    /// Registry that unmapped requirements bind to
    pub fn default_registry(&self) -> Arc<Registry> {
        Arc::clone(&self.default)
    }

    /// All registries in configuration order
    pub fn registries(&self) -> &[Arc<Registry>] {
        &self.registries
    }

    /// Find a registry by UUID
    pub fn by_uuid(&self, uuid: Uuid) -> Option<Arc<Registry>> {
        self.registries
            .iter()
            .find(|registry| registry.uuid == Some(uuid))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    fn matching<F>(&self, predicate: F) -> Vec<Arc<Registry>>
    where
        F: Fn(&Registry) -> bool,
    {
        self.registries
            .iter()
            .filter(|registry| predicate(registry))
            .cloned()
            .collect()
    }

    fn check_consistent(
        &self,
        registry: &Registry,
        lookup: &RegistryLookup,
        url: Option<&str>,
    ) -> LodeResult<()> {
        let uuid_conflict = matches!(
            (lookup.uuid, registry.uuid),
            (Some(wanted), Some(actual)) if wanted != actual
        );
        let url_conflict = url.map_or(false, |url| url != registry.url);

        if uuid_conflict || url_conflict {
            return Err(LodeError::UnknownRegistry {
                reference: format!(
                    "{} (matched '{}' but the other keys disagree)",
                    lookup.describe(),
                    registry.alias
                ),
            });
        }
        Ok(())
    }
}

impl Default for RegistryDirectory {
    fn default() -> Self {
        Self::with_defaults()
    }
}
