//! Metadata template for new projects

use uuid::Uuid;

use lode_core::error::LodeError;
use lode_core::types::ProjectType;
use lode_core::utils::is_valid_name;

use super::ProjectMetadata;
use crate::ConfigResult;

/// Render the metadata file for a new project
pub fn default_metadata(name: &str, project_type: ProjectType) -> ConfigResult<String> {
    if !is_valid_name(name) {
        return Err(LodeError::invalid_metadata(
            "project.name",
            format!("'{}' is not a valid project name", name),
        ));
    }

    let content = format!(
        r#"[build-system]
requires = ["hatchling"]
build-backend = "hatchling.build"

[project]
name = "{name}"
version = "0.1.0"
description = ""
requires-python = ">=3.9"
dependencies = []

[project.optional-dependencies]

[tool.lode.project]
type = "{kind}"
uuid = "{uuid}"
"#,
        name = name,
        kind = project_type,
        uuid = Uuid::new_v4(),
    );

    // The template must read back through the normal path
    ProjectMetadata::parse(&content, super::METADATA_FILE)?;
    Ok(content)
}
