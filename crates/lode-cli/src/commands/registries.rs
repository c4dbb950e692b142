//! Registries command

use lode_config::registries::EntrySource;
use lode_core::error::LodeResult;
use tracing::debug;

use super::CommandContext;

/// List the effective registries and where each one was configured
pub async fn execute(ctx: &CommandContext) -> LodeResult<()> {
    let loader = ctx.loader();
    let project = match loader.find_project_root() {
        Ok(_) => Some(loader.load_project().await?),
        Err(e) => {
            debug!("Listing registries without a project: {}", e);
            None
        },
    };

    let settings = loader.registry_settings(project.as_ref(), &ctx.env).await?;
    let directory = settings.build()?;
    let default = directory.default_registry();
    let colors = ctx.output.colors();

    for (entry, source) in settings.entries() {
        let mut line = format!("{} {}", colors.bold(&entry.alias), entry.url);
        if entry.private {
            line.push_str(" [private]");
        }
        if let Some(ref uuid) = entry.uuid {
            line.push_str(&format!(" uuid={}", uuid));
        }
        let marker = if entry.alias == default.alias { "*" } else { " " };
        ctx.output
            .step(marker, &format!("{} {}", line, colors.dim(&format!("({})", source_label(source)))));
    }
    ctx.output.info(&format!(
        "{} registries, * marks the default",
        directory.len()
    ));
    Ok(())
}

fn source_label(source: &EntrySource) -> String {
    match source {
        EntrySource::Builtin => "built-in".to_string(),
        EntrySource::Global => "registries.toml".to_string(),
        EntrySource::Project => "pyproject.toml".to_string(),
        EntrySource::Environment(variable) => format!("${}", variable),
    }
}
