//! In-memory registry catalog
//!
//! An immutable catalog of registry -> package -> version, used for
//! deterministic tests and for resolving against an offline snapshot file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use lode_core::error::{LodeError, LodeResult};
use lode_core::types::{Registry, Version};
use lode_core::utils::{normalize_name, sha256_digest};

use crate::query::{DeclaredDependency, QueryFuture, RegistryQuery};

/// Serialized catalog: registry alias -> package -> version -> release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub registries: BTreeMap<String, BTreeMap<String, BTreeMap<String, ReleaseRecord>>>,
}

/// One release in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Content hash; derived from the coordinates when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone)]
struct Release {
    dependencies: Vec<DeclaredDependency>,
    hash: String,
}

type Catalog = BTreeMap<String, BTreeMap<String, BTreeMap<Version, Release>>>;

/// Registry query capability backed by an in-memory catalog
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    catalog: Catalog,
    latency: Option<Duration>,
    queries: AtomicUsize,
}

impl MemoryRegistry {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> LodeResult<Self> {
        let mut registry = Self::new();
        for (alias, packages) in &snapshot.registries {
            for (name, releases) in packages {
                for (version, record) in releases {
                    let dependencies: Vec<&str> =
                        record.dependencies.iter().map(String::as_str).collect();
                    registry.publish(alias, name, version, &dependencies)?;
                    if let Some(ref hash) = record.hash {
                        registry.set_hash(alias, name, version, hash)?;
                    }
                }
            }
        }
        Ok(registry)
    }

    /// Load a JSON snapshot file
    pub fn load(path: &Path) -> LodeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LodeError::io(format!("Failed to read snapshot {}", path.display()), e)
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            LodeError::configuration(
                "offline-index",
                format!("{} is not a valid snapshot: {}", path.display(), e),
            )
        })?;
        let registry = Self::from_snapshot(&snapshot)?;
        debug!("Loaded offline index from {}", path.display());
        Ok(registry)
    }

    /// Add a release to the catalog
    pub fn publish(
        &mut self,
        registry: &str,
        name: &str,
        version: &str,
        dependencies: &[&str],
    ) -> LodeResult<&mut Self> {
        let name = normalize_name(name);
        let version: Version = version.parse()?;
        let dependencies = dependencies
            .iter()
            .map(|dependency| DeclaredDependency::parse(dependency))
            .collect::<LodeResult<Vec<_>>>()?;
        let hash = sha256_digest(format!("{}/{}/{}", registry, name, version).as_bytes());

        self.catalog
            .entry(registry.to_string())
            .or_default()
            .entry(name)
            .or_default()
            .insert(version, Release { dependencies, hash });
        Ok(self)
    }

    /// Override the content hash of a published release
    pub fn set_hash(
        &mut self,
        registry: &str,
        name: &str,
        version: &str,
        hash: &str,
    ) -> LodeResult<()> {
        let version: Version = version.parse()?;
        let release = self
            .catalog
            .get_mut(registry)
            .and_then(|packages| packages.get_mut(&normalize_name(name)))
            .and_then(|releases| releases.get_mut(&version))
            .ok_or_else(|| LodeError::PackageNotFound {
                name: format!("{} {}", name, version),
                registry: registry.to_string(),
            })?;
        release.hash = hash.to_string();
        Ok(())
    }

    /// Delay every query, for timeout and cancellation tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of queries answered so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Export the catalog as a snapshot
    pub fn snapshot(&self) -> Snapshot {
        let registries = self
            .catalog
            .iter()
            .map(|(alias, packages)| {
                let packages = packages
                    .iter()
                    .map(|(name, releases)| {
                        let releases = releases
                            .iter()
                            .map(|(version, release)| {
                                let record = ReleaseRecord {
                                    dependencies: release
                                        .dependencies
                                        .iter()
                                        .map(|d| d.spec.to_string())
                                        .collect(),
                                    hash: Some(release.hash.clone()),
                                };
                                (version.to_string(), record)
                            })
                            .collect();
                        (name.clone(), releases)
                    })
                    .collect();
                (alias.clone(), packages)
            })
            .collect();
        Snapshot { registries }
    }

    fn releases(&self, registry: &Registry, name: &str) -> Option<&BTreeMap<Version, Release>> {
        self.catalog
            .get(&registry.alias)
            .and_then(|packages| packages.get(&normalize_name(name)))
    }

    fn release(&self, registry: &Registry, name: &str, version: &Version) -> LodeResult<&Release> {
        self.releases(registry, name)
            .and_then(|releases| releases.get(version))
            .ok_or_else(|| LodeError::PackageNotFound {
                name: format!("{} {}", name, version),
                registry: registry.alias.clone(),
            })
    }

    async fn pause(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RegistryQuery for MemoryRegistry {
    fn list_versions<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
    ) -> QueryFuture<'a, Vec<Version>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self
                .releases(registry, name)
                .map(|releases| releases.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn fetch_dependencies<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, Vec<DeclaredDependency>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.release(registry, name, version)?.dependencies.clone())
        })
    }

    fn content_hash<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, String> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.release(registry, name, version)?.hash.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog() -> MemoryRegistry {
        let mut registry = MemoryRegistry::new();
        registry.publish("pypi", "utils", "1.0", &[]).unwrap();
        registry
            .publish("pypi", "utils", "2.0", &["six>=1.0", "pytest; extra == 'test'"])
            .unwrap();
        registry.publish("corp", "Utils", "9.0", &[]).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_registries_are_separate_namespaces() {
        let catalog = catalog();
        let pypi = Registry::default_index();
        let corp = Registry::new("corp", "https://corp.example/simple");

        let public = catalog.list_versions(&pypi, "utils").await.unwrap();
        let private = catalog.list_versions(&corp, "utils").await.unwrap();
        assert_eq!(public.len(), 2);
        assert_eq!(private, vec!["9.0".parse::<Version>().unwrap()]);
    }

    #[tokio::test]
    async fn test_unknown_package_has_no_versions() {
        let catalog = catalog();
        let versions = catalog
            .list_versions(&Registry::default_index(), "missing")
            .await
            .unwrap();
        assert!(versions.is_empty());

        let err = catalog
            .fetch_dependencies(&Registry::default_index(), "missing", &"1.0".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LodeError::PackageNotFound { .. }));
        assert_eq!(catalog.query_count(), 2);
    }

    #[tokio::test]
    async fn test_dependencies_and_hashes() {
        let catalog = catalog();
        let pypi = Registry::default_index();
        let version: Version = "2.0".parse().unwrap();

        let dependencies = catalog.fetch_dependencies(&pypi, "utils", &version).await.unwrap();
        assert_eq!(dependencies.len(), 2);
        assert_eq!(dependencies[1].extra.as_deref(), Some("test"));

        let hash = catalog.content_hash(&pypi, "utils", &version).await.unwrap();
        assert!(hash.starts_with("sha256:"));
        let again = catalog.content_hash(&pypi, "utils", &version).await.unwrap();
        assert_eq!(hash, again);
    }

    #[test]
    fn test_snapshot_file_loading() {
        let snapshot = serde_json::json!({
            "registries": {
                "pypi": {
                    "requests": {
                        "2.31.0": {
                            "dependencies": ["idna>=2.5,<4"],
                            "hash": "sha256:feed"
                        }
                    },
                    "idna": { "3.6": {} }
                }
            }
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", snapshot).unwrap();

        let catalog = MemoryRegistry::load(file.path()).unwrap();
        let exported = catalog.snapshot();
        let requests = &exported.registries["pypi"]["requests"]["2.31.0"];
        assert_eq!(requests.hash.as_deref(), Some("sha256:feed"));
        assert_eq!(requests.dependencies.len(), 1);
        assert!(exported.registries["pypi"]["idna"]["3.6"].hash.is_some());
    }

    #[test]
    fn test_invalid_snapshot_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"registries\": 3}}").unwrap();
        let err = MemoryRegistry::load(file.path()).unwrap_err();
        assert!(matches!(err, LodeError::Configuration { .. }));

        let mut bad = MemoryRegistry::new();
        assert!(bad.publish("pypi", "x", "not-a-version", &[]).is_err());
        assert!(bad.publish("pypi", "x", "1.0", &["??"]).is_err());
    }
}
