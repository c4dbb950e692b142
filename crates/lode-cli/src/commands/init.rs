//! Init command implementation

use tracing::info;

use lode_config::{default_metadata, METADATA_FILE};
use lode_core::error::{LodeError, LodeResult};
use lode_core::types::ProjectType;

use super::CommandContext;

/// Create `pyproject.toml` in the working directory
pub async fn execute(name: Option<String>, project_type: ProjectType, ctx: &CommandContext) -> LodeResult<()> {
    let path = ctx.cwd.join(METADATA_FILE);
    if path.exists() {
        ctx.output
            .warn(&format!("{} already exists, nothing to do", path));
        return Ok(());
    }

    let name = match name {
        Some(name) => name,
        None => ctx.cwd.file_name().map(str::to_string).ok_or_else(|| {
            LodeError::invalid_metadata(
                "project.name",
                format!("Cannot derive a project name from {}; pass --name", ctx.cwd),
            )
        })?,
    };

    let content = default_metadata(&name, project_type)?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| LodeError::io(format!("Failed to write {}", path), e))?;
    info!("Created {} for {}", path, name);

    ctx.output
        .success(&format!("Created {} project '{}'", project_type, name));
    ctx.output.line("");
    ctx.output.line("Next steps:");
    ctx.output.line("  lode add <requirement>");
    ctx.output.line("  lode lock");
    Ok(())
}
