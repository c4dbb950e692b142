//! Per-pass registry query cache
//!
//! A resolution pass must see a stable catalog: once a version list or a
//! dependency list has been fetched for an identity it is reused for the
//! rest of the pass. The cache is created fresh for every pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use lode_core::types::{PackageIdentity, Version};

use crate::query::{DeclaredDependency, RegistryQuery};
use crate::RegistryResult;

type VersionKey = (PackageIdentity, Version);

/// Query results keyed by registry-scoped identity
#[derive(Debug, Default)]
pub struct QueryCache {
    versions: DashMap<PackageIdentity, Arc<Vec<Version>>>,
    dependencies: DashMap<VersionKey, Arc<Vec<DeclaredDependency>>>,
    hashes: DashMap<VersionKey, String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached version list for an identity
    pub fn versions(&self, identity: &PackageIdentity) -> Option<Arc<Vec<Version>>> {
        let found = self.versions.get(identity).map(|entry| Arc::clone(entry.value()));
        self.record(found.is_some());
        found
    }

    /// Store a version list; the first stored list wins
    pub fn insert_versions(
        &self,
        identity: PackageIdentity,
        versions: Vec<Version>,
    ) -> Arc<Vec<Version>> {
        Arc::clone(
            self.versions
                .entry(identity)
                .or_insert_with(|| Arc::new(versions))
                .value(),
        )
    }

    /// Cached dependency list for a version
    pub fn dependencies(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Option<Arc<Vec<DeclaredDependency>>> {
        let key = (identity.clone(), version.clone());
        let found = self.dependencies.get(&key).map(|entry| Arc::clone(entry.value()));
        self.record(found.is_some());
        found
    }

    /// Store a dependency list; the first stored list wins
    pub fn insert_dependencies(
        &self,
        identity: PackageIdentity,
        version: Version,
        dependencies: Vec<DeclaredDependency>,
    ) -> Arc<Vec<DeclaredDependency>> {
        Arc::clone(
            self.dependencies
                .entry((identity, version))
                .or_insert_with(|| Arc::new(dependencies))
                .value(),
        )
    }

    /// Cached content hash for a version
    pub fn content_hash(&self, identity: &PackageIdentity, version: &Version) -> Option<String> {
        let key = (identity.clone(), version.clone());
        let found = self.hashes.get(&key).map(|entry| entry.value().clone());
        self.record(found.is_some());
        found
    }

    /// Store a content hash
    pub fn insert_content_hash(&self, identity: PackageIdentity, version: Version, hash: String) {
        self.hashes.entry((identity, version)).or_insert(hash);
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            version_entries: self.versions.len(),
            dependency_entries: self.dependencies.len(),
            hash_entries: self.hashes.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Identities with a cached version list
    pub version_entries: usize,
    /// Versions with a cached dependency list
    pub dependency_entries: usize,
    /// Versions with a cached content hash
    pub hash_entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the registry
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A registry query capability fronted by a pass-local cache
#[derive(Clone)]
pub struct CachedRegistry {
    query: Arc<dyn RegistryQuery>,
    cache: Arc<QueryCache>,
}

impl CachedRegistry {
    /// Wrap a query capability with a fresh cache
    pub fn new(query: Arc<dyn RegistryQuery>) -> Self {
        Self {
            query,
            cache: Arc::new(QueryCache::new()),
        }
    }

    /// Versions of an identity, ascending
    pub async fn versions(&self, identity: &PackageIdentity) -> RegistryResult<Arc<Vec<Version>>> {
        if let Some(versions) = self.cache.versions(identity) {
            return Ok(versions);
        }

        debug!("Listing versions of {}", identity);
        let mut versions = self
            .query
            .list_versions(identity.registry(), identity.name())
            .await?;
        versions.sort();
        versions.dedup();
        Ok(self.cache.insert_versions(identity.clone(), versions))
    }

    /// Dependencies declared by one version
    pub async fn dependencies(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> RegistryResult<Arc<Vec<DeclaredDependency>>> {
        if let Some(dependencies) = self.cache.dependencies(identity, version) {
            return Ok(dependencies);
        }

        debug!("Fetching dependencies of {} {}", identity, version);
        let dependencies = self
            .query
            .fetch_dependencies(identity.registry(), identity.name(), version)
            .await?;
        Ok(self
            .cache
            .insert_dependencies(identity.clone(), version.clone(), dependencies))
    }

    /// Content hash of one version
    pub async fn content_hash(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> RegistryResult<String> {
        if let Some(hash) = self.cache.content_hash(identity, version) {
            return Ok(hash);
        }

        let hash = self
            .query
            .content_hash(identity.registry(), identity.name(), version)
            .await?;
        self.cache
            .insert_content_hash(identity.clone(), version.clone(), hash.clone());
        Ok(hash)
    }

    /// Check whether a version list is already cached, without counting a lookup
    pub fn has_versions(&self, identity: &PackageIdentity) -> bool {
        self.cache.versions.contains_key(identity)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
