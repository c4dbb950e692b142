//! Project metadata (`pyproject.toml`) reading
//!
//! The metadata file is read into a typed view that exposes the project's
//! requirements, its optional dependency groups and its registry overrides.
//! Requirements bind to registries only through a `RegistryBindings`, so an
//! override naming an unknown registry fails before resolution starts.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lode_core::error::{LodeError, LodeResult};
use lode_core::types::{Origin, ProjectType, RegistryRef, Requirement, RequirementSpec};
use lode_core::utils::{is_valid_name, normalize_name};
use lode_core::{RegistryBindings, RegistryDirectory};

use crate::document::decode;
use crate::registries::RegistryEntry;
use crate::ConfigResult;

mod edit;
mod factory;

pub use edit::MetadataEditor;
pub use factory::default_metadata;

/// Name of the project metadata file
pub const METADATA_FILE: &str = "pyproject.toml";

/// Raw file layout; everything optional so missing fields can be reported
/// with their path
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct PyProject {
    #[serde(default)]
    project: Option<ProjectTable>,
    #[serde(default)]
    tool: Option<ToolTable>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
    dependencies: Option<Vec<String>>,
    #[serde(rename = "optional-dependencies", default)]
    optional_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ToolTable {
    lode: Option<LodeTable>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct LodeTable {
    project: Option<ProjectMarker>,
    #[serde(default)]
    dependencies: BTreeMap<String, OverrideSpec>,
    #[serde(default)]
    registries: Vec<RegistryEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ProjectMarker {
    #[serde(rename = "type")]
    project_type: Option<String>,
    uuid: Option<String>,
}

/// Registry override (simple reference or detailed table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
enum OverrideSpec {
    /// Alias, URL or UUID of a registry
    Reference(String),
    /// Registry reference plus package UUID
    Detailed {
        registry: String,
        #[serde(default)]
        uuid: Option<String>,
    },
}

/// A validated registry override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOverride {
    pub reference: RegistryRef,
    /// Package UUID, when the project pins one
    pub uuid: Option<Uuid>,
}

/// Typed view of a project's metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: Option<String>,
    pub requires_python: Option<String>,
    pub project_type: ProjectType,
    pub uuid: Option<Uuid>,
    dependencies: Vec<RequirementSpec>,
    optional: BTreeMap<String, Vec<RequirementSpec>>,
    overrides: BTreeMap<String, RegistryOverride>,
    registries: Vec<RegistryEntry>,
}

impl ProjectMetadata {
    /// Parse and validate metadata content
    pub fn parse(content: &str, file: &str) -> ConfigResult<Self> {
        let raw: PyProject = decode(content, file)?;

        let project = raw
            .project
            .ok_or_else(|| LodeError::invalid_metadata("project", "missing [project] table"))?;
        let name = project
            .name
            .ok_or_else(|| LodeError::invalid_metadata("project.name", "missing project name"))?;
        if !is_valid_name(&name) {
            return Err(LodeError::invalid_metadata(
                "project.name",
                format!("'{}' is not a valid project name", name),
            ));
        }
        let raw_dependencies = project.dependencies.ok_or_else(|| {
            LodeError::invalid_metadata("project.dependencies", "missing dependency list")
        })?;

        let lode = raw.tool.and_then(|tool| tool.lode).unwrap_or_default();
        let marker = lode.project.ok_or_else(|| {
            LodeError::invalid_metadata("tool.lode.project", "missing [tool.lode.project] table")
        })?;
        let project_type: ProjectType = marker
            .project_type
            .ok_or_else(|| {
                LodeError::invalid_metadata("tool.lode.project.type", "missing project type")
            })?
            .parse()?;
        let uuid = marker
            .uuid
            .map(|raw| parse_uuid(&raw, "tool.lode.project.uuid"))
            .transpose()?;

        let dependencies = parse_specs(&raw_dependencies, "project.dependencies")?;

        let mut optional = BTreeMap::new();
        for (group, specs) in &project.optional_dependencies {
            let field = format!("project.optional-dependencies.{}", group);
            if !is_valid_name(group) {
                return Err(LodeError::invalid_metadata(field, "invalid extra name"));
            }
            optional.insert(normalize_name(group), parse_specs(specs, &field)?);
        }

        let mut overrides = BTreeMap::new();
        for (package, spec) in &lode.dependencies {
            let field = format!("tool.lode.dependencies.{}", package);
            if !is_valid_name(package) {
                return Err(LodeError::invalid_metadata(field, "invalid package name"));
            }
            let (reference, uuid) = match spec {
                OverrideSpec::Reference(reference) => (reference, None),
                OverrideSpec::Detailed { registry, uuid } => (registry, uuid.as_ref()),
            };
            let reference: RegistryRef = reference
                .parse()
                .map_err(|e: LodeError| LodeError::invalid_metadata(field.clone(), e.to_string()))?;
            let uuid = uuid
                .map(|raw| parse_uuid(raw, &format!("{}.uuid", field)))
                .transpose()?;
            overrides.insert(normalize_name(package), RegistryOverride { reference, uuid });
        }

        Ok(Self {
            name,
            version: project.version,
            requires_python: project.requires_python,
            project_type,
            uuid,
            dependencies,
            optional,
            overrides,
            registries: lode.registries,
        })
    }

    /// Load and parse a metadata file
    pub async fn load(path: &Utf8Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LodeError::io(format!("Failed to read {}", path), e))?;
        Self::parse(&content, path.as_str())
    }

    /// Resolve every override against the registry directory
    pub fn bindings(&self, directory: &RegistryDirectory) -> LodeResult<RegistryBindings> {
        let mut bindings = RegistryBindings::new(directory);
        for (name, registry) in &self.overrides {
            bindings.bind(directory, name, &registry.reference, registry.uuid)?;
        }
        Ok(bindings)
    }

    /// Direct requirements, bound to their registries
    pub fn requirements(&self, bindings: &RegistryBindings) -> LodeResult<Vec<Requirement>> {
        bind_all(&self.dependencies, bindings)
    }

    /// Optional dependency groups, bound to their registries
    pub fn extras(
        &self,
        bindings: &RegistryBindings,
    ) -> LodeResult<BTreeMap<String, Vec<Requirement>>> {
        self.optional
            .iter()
            .map(|(group, specs)| Ok((group.clone(), bind_all(specs, bindings)?)))
            .collect()
    }

    /// Registry overrides keyed by normalized package name
    pub fn registry_overrides(&self) -> BTreeMap<String, RegistryRef> {
        self.overrides
            .iter()
            .map(|(name, registry)| (name.clone(), registry.reference.clone()))
            .collect()
    }

    /// Override details keyed by normalized package name
    pub fn overrides(&self) -> &BTreeMap<String, RegistryOverride> {
        &self.overrides
    }

    /// Unbound direct requirement specs, in file order
    pub fn dependency_specs(&self) -> &[RequirementSpec] {
        &self.dependencies
    }

    /// Names of the optional dependency groups
    pub fn extra_names(&self) -> impl Iterator<Item = &str> {
        self.optional.keys().map(String::as_str)
    }

    /// Registries declared by the project
    pub fn registries(&self) -> &[RegistryEntry] {
        &self.registries
    }

    /// Interpreter requirement recorded in the manifest
    pub fn python_version(&self) -> &str {
        self.requires_python.as_deref().unwrap_or("*")
    }
}

fn parse_specs(raw: &[String], field: &str) -> ConfigResult<Vec<RequirementSpec>> {
    raw.iter()
        .enumerate()
        .map(|(index, requirement)| {
            RequirementSpec::parse(requirement).map_err(|e| {
                LodeError::invalid_metadata(format!("{}[{}]", field, index), e.to_string())
            })
        })
        .collect()
}

fn bind_all(specs: &[RequirementSpec], bindings: &RegistryBindings) -> LodeResult<Vec<Requirement>> {
    specs
        .iter()
        .map(|spec| {
            let identity = bindings.identity(&spec.name)?;
            Ok(Requirement::bind(spec, identity, Origin::Direct))
        })
        .collect()
}

fn parse_uuid(raw: &str, field: &str) -> ConfigResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| {
        LodeError::invalid_metadata(field, format!("'{}' is not a UUID: {}", raw, e))
    })
}
