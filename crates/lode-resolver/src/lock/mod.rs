//! Manifest synthesis and validation
//!
//! Turns a resolution graph into a `Manifest`, decides whether an existing
//! manifest still matches the project, and answers "why is this installed"
//! from the `required_by` lists. Nothing here touches the network.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use lode_core::types::{Freshness, Manifest, ManifestEntry, PackageIdentity, Requirement};
use lode_core::utils::{normalize_name, Digest};

use crate::graph::ResolutionGraph;

/// Digest of everything in the project that affects resolution.
///
/// Requirement order does not matter; the registry binding, package UUID,
/// constraint, extras and marker of every requirement do, and so does
/// which optional groups were selected for the lock.
pub fn project_digest(
    python_version: &str,
    requirements: &[Requirement],
    extras: &BTreeMap<String, Vec<Requirement>>,
    selected: &[String],
) -> String {
    let mut lines: Vec<String> = requirements
        .iter()
        .map(|requirement| requirement_line("", requirement))
        .collect();
    for (group, requirements) in extras {
        let group = normalize_name(group);
        lines.extend(
            requirements
                .iter()
                .map(|requirement| requirement_line(&group, requirement)),
        );
    }
    lines.extend(
        selected
            .iter()
            .map(|group| format!("selected|{}", normalize_name(group))),
    );
    lines.sort();
    lines.dedup();

    let mut digest = Digest::new();
    digest.record(&format!("python {}", python_version.trim()));
    for line in &lines {
        digest.record(line);
    }
    digest.finish()
}

fn requirement_line(group: &str, requirement: &Requirement) -> String {
    let identity = &requirement.identity;
    let registry = identity.registry();
    let extras: Vec<&str> = requirement.extras.iter().map(String::as_str).collect();
    format!(
        "{}|{}|{}|{}|{}|{}|{}|[{}]|{}",
        group,
        identity.name(),
        registry.alias,
        registry.url,
        registry.uuid.map(|uuid| uuid.to_string()).unwrap_or_default(),
        identity.uuid().map(|uuid| uuid.to_string()).unwrap_or_default(),
        requirement.constraint.fingerprint(),
        extras.join(","),
        requirement.marker.as_deref().unwrap_or_default(),
    )
}

/// Build the manifest for a resolved graph
pub fn synthesize(graph: &ResolutionGraph, project_hash: &str, python_version: &str) -> Manifest {
    let dependencies: Vec<ManifestEntry> = graph
        .packages()
        .into_iter()
        .map(|package| ManifestEntry {
            identity: package.identity.clone(),
            version: package.version.clone(),
            content_hash: package.content_hash.clone(),
            direct: package.direct,
            required_by: graph
                .required_by(&package.identity)
                .into_iter()
                .cloned()
                .collect(),
        })
        .collect();

    debug!("Synthesized manifest with {} entries", dependencies.len());
    Manifest {
        tool_version: format!("lode {}", env!("CARGO_PKG_VERSION")),
        python_version: python_version.to_string(),
        project_hash: project_hash.to_string(),
        dependencies,
    }
}

/// Compare a manifest with the current project digest
pub fn validate(manifest: &Manifest, project_hash: &str) -> Freshness {
    if manifest.project_hash == project_hash {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

/// Each pinned package and the packages that required it
pub fn status(manifest: &Manifest) -> IndexMap<PackageIdentity, Vec<PackageIdentity>> {
    manifest
        .dependencies
        .iter()
        .map(|entry| (entry.identity.clone(), entry.required_by.clone()))
        .collect()
}

/// Every path from a direct dependency down to `target`.
///
/// Paths are listed root first and end with `target`; a package on a
/// cycle is never visited twice within one path.
pub fn dependency_paths(manifest: &Manifest, target: &PackageIdentity) -> Vec<Vec<PackageIdentity>> {
    let mut paths = Vec::new();
    let mut on_path = HashSet::new();
    let mut current = vec![target.clone()];
    on_path.insert(target.clone());
    walk_up(manifest, target, &mut current, &mut on_path, &mut paths);

    for path in &mut paths {
        path.reverse();
    }
    paths.sort_by(|a, b| {
        let a: Vec<_> = a.iter().map(PackageIdentity::sort_key).collect();
        let b: Vec<_> = b.iter().map(PackageIdentity::sort_key).collect();
        a.cmp(&b)
    });
    paths
}

fn walk_up(
    manifest: &Manifest,
    identity: &PackageIdentity,
    current: &mut Vec<PackageIdentity>,
    on_path: &mut HashSet<PackageIdentity>,
    paths: &mut Vec<Vec<PackageIdentity>>,
) {
    let Some(entry) = manifest.entry(identity) else {
        return;
    };
    if entry.direct {
        paths.push(current.clone());
    }
    for parent in &entry.required_by {
        if !on_path.insert(parent.clone()) {
            continue;
        }
        current.push(parent.clone());
        walk_up(manifest, parent, current, on_path, paths);
        current.pop();
        on_path.remove(parent);
    }
}
