//! Remove command

use lode_config::{write_manifest, MetadataEditor, Project, ProjectMetadata};
use lode_core::error::LodeResult;

use super::add::{read_metadata, write_metadata};
use super::lock::{resolve_project, LockRequest};
use super::CommandContext;

/// Drop a direct requirement and its registry override, then re-lock
pub async fn execute(package: String, ctx: &CommandContext) -> LodeResult<()> {
    let loader = ctx.loader();
    let project = loader.load_project().await?;

    let content = read_metadata(&project).await?;
    let mut editor = MetadataEditor::parse(&content, project.metadata_path.as_str())?;
    editor.remove_dependency(&package)?;
    let edited = editor.to_string();

    let edited_project = Project {
        metadata: ProjectMetadata::parse(&edited, project.metadata_path.as_str())?,
        ..project.clone()
    };
    let manifest = resolve_project(ctx, &loader, &edited_project, &LockRequest::default()).await?;

    write_metadata(&project, &edited).await?;
    write_manifest(&project.manifest_path, &manifest)?;
    ctx.output.success(&format!("Removed {}", package));
    Ok(())
}
