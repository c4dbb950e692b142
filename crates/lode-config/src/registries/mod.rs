//! Registry configuration layering and environment overrides

use std::collections::{BTreeSet, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use lode_core::error::LodeError;
use lode_core::types::{Registry, DEFAULT_REGISTRY_ALIAS, DEFAULT_REGISTRY_URL};
use lode_core::RegistryDirectory;

use crate::document::decode;
use crate::ConfigResult;

/// Name of the global registry file
pub const REGISTRIES_FILE: &str = "registries.toml";

/// The global `registries.toml` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistriesFile {
    /// Alias of the default registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub registries: Vec<RegistryEntry>,
}

/// A registry as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub alias: String,
    pub url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl RegistryEntry {
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: url.into(),
            private: false,
            uuid: None,
        }
    }

    /// Convert into a registry record; `field` names the entry in errors
    pub fn to_registry(&self, field: &str) -> ConfigResult<Registry> {
        let mut registry = Registry::new(self.alias.clone(), self.url.clone());
        registry.private = self.private;
        if let Some(ref raw) = self.uuid {
            let uuid = Uuid::parse_str(raw.trim()).map_err(|e| {
                LodeError::configuration(
                    format!("{}.uuid", field),
                    format!("'{}' is not a UUID: {}", raw, e),
                )
            })?;
            registry = registry.with_uuid(uuid);
        }
        Ok(registry)
    }
}

/// Parse `registries.toml` content
pub fn parse_registries_file(content: &str, file: &str) -> ConfigResult<RegistriesFile> {
    decode(content, file)
}

/// Load `registries.toml` if it exists
pub async fn load_registries_file(path: &Utf8Path) -> ConfigResult<Option<RegistriesFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LodeError::io(format!("Failed to read {}", path), e))?;
    parse_registries_file(&content, path.as_str()).map(Some)
}

/// Lode home directory: `$LODE_HOME`, else `~/.lode`
pub fn lode_home() -> ConfigResult<Utf8PathBuf> {
    if let Ok(home) = std::env::var("LODE_HOME") {
        if !home.is_empty() {
            return Ok(Utf8PathBuf::from(home));
        }
    }

    let home_dir = dirs::home_dir()
        .ok_or_else(|| LodeError::configuration("home_dir", "Could not determine home directory"))?;

    let home = Utf8PathBuf::try_from(home_dir).map_err(|e| {
        LodeError::configuration("home_dir", format!("Invalid home directory path: {}", e))
    })?;
    Ok(home.join(".lode"))
}

/// Collect `LODE_*` environment variables
pub fn collect_env_overrides() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("LODE_"))
        .collect()
}

/// Where a registry entry came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    Builtin,
    Global,
    Project,
    Environment(String),
}

/// Registry configuration assembled layer by layer.
///
/// Layers, lowest first: the built-in default registry, the global
/// `registries.toml`, the project's `[[tool.lode.registries]]`, then
/// environment overrides. A later layer replaces entries with the same
/// alias.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    entries: Vec<(RegistryEntry, EntrySource)>,
    default: String,
}

impl RegistrySettings {
    /// Settings holding only the built-in default registry
    pub fn new() -> Self {
        Self {
            entries: vec![(
                RegistryEntry::new(DEFAULT_REGISTRY_ALIAS, DEFAULT_REGISTRY_URL),
                EntrySource::Builtin,
            )],
            default: DEFAULT_REGISTRY_ALIAS.to_string(),
        }
    }

    /// Apply the global registry file
    pub fn layer_global(&mut self, file: &RegistriesFile) {
        self.layer(&file.registries, EntrySource::Global);
        if let Some(ref default) = file.default {
            self.default = default.trim().to_string();
        }
    }

    /// Apply project registries
    pub fn layer_project(&mut self, entries: &[RegistryEntry]) {
        self.layer(entries, EntrySource::Project);
    }

    fn layer(&mut self, entries: &[RegistryEntry], source: EntrySource) {
        let replaced: BTreeSet<&str> = entries.iter().map(|e| e.alias.trim()).collect();
        self.entries
            .retain(|(entry, _)| !replaced.contains(entry.alias.trim()));
        self.entries
            .extend(entries.iter().map(|entry| (entry.clone(), source.clone())));
    }

    /// Apply `LODE_DEFAULT_REGISTRY` and `LODE_REGISTRY_<ALIAS>` overrides
    pub fn apply_env_overrides(&mut self, overrides: &HashMap<String, String>) {
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();

        for key in keys {
            let value = overrides[key].trim();
            if key == "LODE_DEFAULT_REGISTRY" {
                self.default = value.to_string();
            } else if let Some(suffix) = key.strip_prefix("LODE_REGISTRY_") {
                let existing = self
                    .entries
                    .iter_mut()
                    .find(|(entry, _)| env_suffix(&entry.alias) == suffix);
                match existing {
                    Some((entry, source)) => {
                        debug!("{} re-points registry '{}'", key, entry.alias);
                        entry.url = value.to_string();
                        *source = EntrySource::Environment(key.clone());
                    },
                    None => {
                        let alias = suffix.to_ascii_lowercase().replace('_', "-");
                        debug!("{} adds registry '{}'", key, alias);
                        self.entries.push((
                            RegistryEntry::new(alias, value),
                            EntrySource::Environment(key.clone()),
                        ));
                    },
                }
            }
        }
    }

    /// Alias of the default registry
    pub fn default_alias(&self) -> &str {
        &self.default
    }

    /// Entries with their sources, in directory order
    pub fn entries(&self) -> &[(RegistryEntry, EntrySource)] {
        &self.entries
    }

    /// Validate and build the registry directory
    pub fn build(&self) -> ConfigResult<RegistryDirectory> {
        let registries = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, (entry, _))| entry.to_registry(&format!("registries[{}]", index)))
            .collect::<ConfigResult<Vec<_>>>()?;
        RegistryDirectory::new(registries, &self.default)
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::new()
    }
}

/// `corp-mirror.eu` -> `CORP_MIRROR_EU`
fn env_suffix(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
