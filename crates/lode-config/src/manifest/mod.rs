//! Manifest (`pyproject.lock`) reading and atomic writing
//!
//! Rendering goes through `toml_edit` so the layout is fixed: `[python]`,
//! `[manifest]`, then one `[[dependencies]]` block per package followed by
//! its `[dependencies.registry]` table. Entries and their `by` lists are
//! sorted and nothing time-dependent is written, so equal manifests render
//! to identical bytes.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use camino::Utf8Path;
use serde::Deserialize;
use tempfile::NamedTempFile;
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table};
use tracing::debug;
use uuid::Uuid;

use lode_core::error::LodeError;
use lode_core::types::{
    Manifest, ManifestEntry, PackageIdentity, Registry, Version, VersionError,
    MANIFEST_FORMAT_VERSION,
};
use lode_core::utils::normalize_name;

use crate::document::decode;
use crate::ConfigResult;

/// Name of the manifest file, next to the metadata file
pub const MANIFEST_FILE: &str = "pyproject.lock";

#[derive(Debug, Deserialize)]
struct RawManifest {
    python: Option<RawPython>,
    manifest: Option<RawHeader>,
    #[serde(default)]
    dependencies: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawPython {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    version: Option<String>,
    tool: Option<String>,
    #[serde(rename = "project-hash")]
    project_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: Option<String>,
    uuid: Option<String>,
    version: Option<String>,
    hash: Option<String>,
    #[serde(default)]
    direct: bool,
    #[serde(default)]
    by: Vec<RawParent>,
    registry: Option<RawRegistry>,
}

#[derive(Debug, Deserialize)]
struct RawParent {
    name: Option<String>,
    registry: Option<String>,
    uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    alias: Option<String>,
    url: Option<String>,
    uuid: Option<String>,
}

/// Render a manifest as TOML
pub fn render_manifest(manifest: &Manifest) -> String {
    let mut document = DocumentMut::new();

    let mut python = Table::new();
    python.insert("version", toml_edit::value(manifest.python_version.as_str()));
    document.insert("python", Item::Table(python));

    let mut header = Table::new();
    header.decor_mut().set_prefix("\n");
    header.insert("version", toml_edit::value(MANIFEST_FORMAT_VERSION));
    header.insert("tool", toml_edit::value(manifest.tool_version.as_str()));
    header.insert("project-hash", toml_edit::value(manifest.project_hash.as_str()));
    document.insert("manifest", Item::Table(header));

    let mut entries: Vec<&ManifestEntry> = manifest.dependencies.iter().collect();
    entries.sort_by(|a, b| a.identity.sort_key().cmp(&b.identity.sort_key()));

    let mut dependencies = ArrayOfTables::new();
    for entry in entries {
        dependencies.push(entry_table(entry));
    }
    if !dependencies.is_empty() {
        document.insert("dependencies", Item::ArrayOfTables(dependencies));
    }

    document.to_string()
}

fn entry_table(entry: &ManifestEntry) -> Table {
    let identity = &entry.identity;
    let mut table = Table::new();
    table.decor_mut().set_prefix("\n");
    table.insert("name", toml_edit::value(identity.name()));
    if let Some(uuid) = identity.uuid() {
        table.insert("uuid", toml_edit::value(uuid.to_string()));
    }
    table.insert("version", toml_edit::value(entry.version.to_string()));
    table.insert("hash", toml_edit::value(entry.content_hash.as_str()));
    table.insert("direct", toml_edit::value(entry.direct));

    let mut parents: Vec<&PackageIdentity> = entry.required_by.iter().collect();
    parents.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    parents.dedup();
    let mut by = Array::new();
    for parent in parents {
        let mut reference = InlineTable::new();
        reference.insert("name", parent.name().into());
        reference.insert("registry", parent.registry().alias.as_str().into());
        if let Some(uuid) = parent.uuid() {
            reference.insert("uuid", uuid.to_string().into());
        }
        by.push(reference);
    }
    table.insert("by", toml_edit::value(by));

    let source = identity.registry();
    let mut registry = Table::new();
    registry.insert("alias", toml_edit::value(source.alias.as_str()));
    registry.insert("url", toml_edit::value(source.url.as_str()));
    if let Some(uuid) = source.uuid {
        registry.insert("uuid", toml_edit::value(uuid.to_string()));
    }
    table.insert("registry", Item::Table(registry));
    table
}

/// Parse and validate manifest content
pub fn parse_manifest(content: &str, file: &str) -> ConfigResult<Manifest> {
    let raw: RawManifest = decode(content, file)?;

    let python_version = raw
        .python
        .and_then(|python| python.version)
        .ok_or_else(|| LodeError::invalid_manifest("python.version", "missing interpreter version"))?;
    let header = raw
        .manifest
        .ok_or_else(|| LodeError::invalid_manifest("manifest", "missing [manifest] table"))?;
    let format = header
        .version
        .ok_or_else(|| LodeError::invalid_manifest("manifest.version", "missing format version"))?;
    if format != MANIFEST_FORMAT_VERSION {
        return Err(LodeError::invalid_manifest(
            "manifest.version",
            format!(
                "unsupported format '{}', expected '{}'",
                format, MANIFEST_FORMAT_VERSION
            ),
        ));
    }
    let project_hash = header
        .project_hash
        .ok_or_else(|| LodeError::invalid_manifest("manifest.project-hash", "missing project hash"))?;

    // First pass builds identities, second pass links `by` references
    let mut registries: HashMap<(String, String, Option<Uuid>), Arc<Registry>> = HashMap::new();
    let mut identities = Vec::with_capacity(raw.dependencies.len());
    for (index, entry) in raw.dependencies.iter().enumerate() {
        let field = format!("dependencies[{}]", index);
        let source = entry
            .registry
            .as_ref()
            .ok_or_else(|| LodeError::invalid_manifest(format!("{}.registry", field), "missing registry"))?;
        let alias = required(&source.alias, &format!("{}.registry.alias", field))?;
        let url = required(&source.url, &format!("{}.registry.url", field))?;
        let registry_uuid = optional_uuid(&source.uuid, &format!("{}.registry.uuid", field))?;

        let registry = registries
            .entry((alias.to_string(), url.to_string(), registry_uuid))
            .or_insert_with(|| {
                let registry = Registry::new(alias, url);
                Arc::new(match registry_uuid {
                    Some(uuid) => registry.with_uuid(uuid),
                    None => registry,
                })
            })
            .clone();

        let name = required(&entry.name, &format!("{}.name", field))?;
        let identity = PackageIdentity::new(name, registry)
            .map_err(|e| LodeError::invalid_manifest(format!("{}.name", field), e.to_string()))?
            .with_uuid(optional_uuid(&entry.uuid, &format!("{}.uuid", field))?);
        identities.push(identity);
    }

    let mut dependencies = Vec::with_capacity(identities.len());
    for (index, (entry, identity)) in raw.dependencies.iter().zip(&identities).enumerate() {
        let field = format!("dependencies[{}]", index);
        let version: Version = required(&entry.version, &format!("{}.version", field))?
            .parse()
            .map_err(|e: VersionError| {
                LodeError::invalid_manifest(format!("{}.version", field), e.to_string())
            })?;
        let content_hash = required(&entry.hash, &format!("{}.hash", field))?.to_string();

        let mut required_by = Vec::with_capacity(entry.by.len());
        for (position, parent) in entry.by.iter().enumerate() {
            let parent_field = format!("{}.by[{}]", field, position);
            required_by.push(link_parent(parent, &identities, &parent_field)?);
        }

        dependencies.push(ManifestEntry {
            identity: identity.clone(),
            version,
            content_hash,
            direct: entry.direct,
            required_by,
        });
    }

    Ok(Manifest {
        tool_version: header.tool.unwrap_or_default(),
        python_version,
        project_hash,
        dependencies,
    })
}

fn link_parent(
    parent: &RawParent,
    identities: &[PackageIdentity],
    field: &str,
) -> ConfigResult<PackageIdentity> {
    let uuid = optional_uuid(&parent.uuid, &format!("{}.uuid", field))?;
    let found = match uuid {
        Some(uuid) => identities.iter().find(|identity| identity.uuid() == Some(uuid)),
        None => {
            let name = normalize_name(required(&parent.name, &format!("{}.name", field))?);
            let alias = required(&parent.registry, &format!("{}.registry", field))?;
            identities.iter().find(|identity| {
                identity.uuid().is_none()
                    && identity.name() == name
                    && identity.registry().alias == alias
            })
        },
    };
    found
        .cloned()
        .ok_or_else(|| LodeError::invalid_manifest(field, "refers to a package missing from the manifest"))
}

fn required<'a>(value: &'a Option<String>, field: &str) -> ConfigResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LodeError::invalid_manifest(field, "missing value"))
}

fn optional_uuid(value: &Option<String>, field: &str) -> ConfigResult<Option<Uuid>> {
    value
        .as_deref()
        .map(|raw| {
            Uuid::parse_str(raw.trim()).map_err(|e| {
                LodeError::invalid_manifest(field, format!("'{}' is not a UUID: {}", raw, e))
            })
        })
        .transpose()
}

/// Read the manifest if it exists
pub async fn read_manifest(path: &Utf8Path) -> ConfigResult<Option<Manifest>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LodeError::io(format!("Failed to read {}", path), e))?;
    parse_manifest(&content, path.as_str()).map(Some)
}

/// Replace the manifest atomically: temp file in the same directory,
/// synced, then persisted over the target
pub fn write_manifest(path: &Utf8Path, manifest: &Manifest) -> ConfigResult<()> {
    let content = render_manifest(manifest);
    let directory = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let mut file = NamedTempFile::new_in(directory)
        .map_err(|e| LodeError::io(format!("Failed to create a temporary file in {}", directory), e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| LodeError::io(format!("Failed to write {}", file.path().display()), e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| LodeError::io(format!("Failed to sync {}", file.path().display()), e))?;
    file.persist(path)
        .map_err(|e| LodeError::io(format!("Failed to replace {}", path), e.error))?;

    debug!("Wrote {} entries to {}", manifest.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests;
