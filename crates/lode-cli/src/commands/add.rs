//! Add command: record a dependency and re-lock

use tracing::info;

use lode_config::{write_manifest, MetadataEditor, Project, ProjectMetadata};
use lode_core::error::{LodeError, LodeResult};
use lode_core::types::{RegistryRef, RequirementSpec};

use super::lock::{resolve_project, LockRequest};
use super::CommandContext;

/// Add or replace a direct requirement.
///
/// The metadata and the manifest are only written once the edited project
/// resolves, so a failed add leaves both files as they were.
pub async fn execute(requirement: String, registry: Option<String>, ctx: &CommandContext) -> LodeResult<()> {
    let loader = ctx.loader();
    let project = loader.load_project().await?;

    let spec = RequirementSpec::parse(&requirement)?;
    let reference = registry
        .as_deref()
        .map(str::parse::<RegistryRef>)
        .transpose()?;
    if let Some(ref reference) = reference {
        let directory = loader.registry_directory(Some(&project), &ctx.env).await?;
        let target = directory.resolve(reference)?;
        info!("Binding {} to registry {}", spec.normalized_name(), target.alias);
    }

    let content = read_metadata(&project).await?;
    let mut editor = MetadataEditor::parse(&content, project.metadata_path.as_str())?;
    editor.add_dependency(&spec, reference.as_ref())?;
    let edited = editor.to_string();

    let metadata = ProjectMetadata::parse(&edited, project.metadata_path.as_str())?;
    let edited_project = Project {
        metadata,
        ..project.clone()
    };
    let manifest = resolve_project(ctx, &loader, &edited_project, &LockRequest::default()).await?;

    write_metadata(&project, &edited).await?;
    write_manifest(&project.manifest_path, &manifest)?;
    ctx.output.success(&format!("Added {}", spec));
    Ok(())
}

pub(crate) async fn read_metadata(project: &Project) -> LodeResult<String> {
    tokio::fs::read_to_string(&project.metadata_path)
        .await
        .map_err(|e| LodeError::io(format!("Failed to read {}", project.metadata_path), e))
}

pub(crate) async fn write_metadata(project: &Project, content: &str) -> LodeResult<()> {
    tokio::fs::write(&project.metadata_path, content)
        .await
        .map_err(|e| LodeError::io(format!("Failed to write {}", project.metadata_path), e))
}
