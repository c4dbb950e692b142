//! Format-preserving edits of the metadata file

use std::fmt;

use toml_edit::{Array, DocumentMut, Item, Table, Value};

use lode_core::error::LodeError;
use lode_core::types::{RegistryRef, RequirementSpec};
use lode_core::utils::{is_valid_name, normalize_name};

use crate::document::parse_document;
use crate::ConfigResult;

/// Edits `pyproject.toml` in place, keeping comments and layout
#[derive(Debug, Clone)]
pub struct MetadataEditor {
    document: DocumentMut,
}

impl MetadataEditor {
    /// Parse metadata content for editing
    pub fn parse(content: &str, file: &str) -> ConfigResult<Self> {
        Ok(Self {
            document: parse_document(content, file)?,
        })
    }

    /// Add or replace a direct requirement.
    ///
    /// A requirement naming the same package replaces the existing entry in
    /// place. With a registry the override in `[tool.lode.dependencies]` is
    /// written too; without one an existing override is left alone.
    pub fn add_dependency(
        &mut self,
        requirement: &RequirementSpec,
        registry: Option<&RegistryRef>,
    ) -> ConfigResult<()> {
        let name = requirement.normalized_name();
        let rendered = requirement.to_string();

        let dependencies = self.dependencies_mut()?;
        match position_of(dependencies, &name) {
            Some(index) => {
                dependencies.replace(index, rendered);
            },
            None => dependencies.push(rendered),
        }

        if let Some(reference) = registry {
            self.remove_override(&name);
            let overrides = self.table_path(&["tool", "lode", "dependencies"])?;
            overrides.insert(&name, toml_edit::value(reference.to_string()));
        }
        Ok(())
    }

    /// Remove a direct requirement and its registry override
    pub fn remove_dependency(&mut self, name: &str) -> ConfigResult<()> {
        if !is_valid_name(name) {
            return Err(LodeError::invalid_metadata(
                "project.dependencies",
                format!("'{}' is not a valid package name", name),
            ));
        }
        let normalized = normalize_name(name);

        let dependencies = self.dependencies_mut()?;
        let Some(index) = position_of(dependencies, &normalized) else {
            return Err(LodeError::invalid_metadata(
                "project.dependencies",
                format!("'{}' is not a dependency of this project", name),
            ));
        };
        dependencies.remove(index);
        while let Some(index) = position_of(dependencies, &normalized) {
            dependencies.remove(index);
        }

        self.remove_override(&normalized);
        Ok(())
    }

    fn dependencies_mut(&mut self) -> ConfigResult<&mut Array> {
        let project = self
            .document
            .get_mut("project")
            .and_then(Item::as_table_mut)
            .ok_or_else(|| LodeError::invalid_metadata("project", "missing [project] table"))?;
        project
            .entry("dependencies")
            .or_insert(toml_edit::value(Array::new()))
            .as_array_mut()
            .ok_or_else(|| {
                LodeError::invalid_metadata(
                    "project.dependencies",
                    "expected an array of requirement strings",
                )
            })
    }

    fn remove_override(&mut self, normalized: &str) {
        let Some(overrides) = self
            .document
            .get_mut("tool")
            .and_then(|tool| tool.get_mut("lode"))
            .and_then(|lode| lode.get_mut("dependencies"))
            .and_then(Item::as_table_like_mut)
        else {
            return;
        };

        let keys: Vec<String> = overrides
            .iter()
            .map(|(key, _)| key.to_string())
            .filter(|key| normalize_name(key) == normalized)
            .collect();
        for key in keys {
            overrides.remove(&key);
        }
    }

    /// Walk to a nested table, creating implicit tables on the way
    fn table_path(&mut self, path: &[&str]) -> ConfigResult<&mut Table> {
        let mut table = self.document.as_table_mut();
        for (depth, key) in path.iter().enumerate() {
            let item = table.entry(key).or_insert_with(|| {
                let mut child = Table::new();
                child.set_implicit(true);
                Item::Table(child)
            });
            table = item.as_table_mut().ok_or_else(|| {
                LodeError::invalid_metadata(path[..=depth].join("."), "expected a table")
            })?;
        }
        Ok(table)
    }
}

impl fmt::Display for MetadataEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document)
    }
}

fn position_of(dependencies: &Array, normalized: &str) -> Option<usize> {
    dependencies.iter().position(|value| names_package(value, normalized))
}

fn names_package(value: &Value, normalized: &str) -> bool {
    value
        .as_str()
        .and_then(|raw| RequirementSpec::parse(raw).ok())
        .map_or(false, |spec| spec.normalized_name() == normalized)
}
