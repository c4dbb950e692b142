//! Lock command: resolve the project and write the manifest

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use lode_config::{read_manifest, write_manifest, ConfigLoader, Project, Settings};
use lode_core::error::{LodeError, LodeResult};
use lode_core::types::{Freshness, Manifest, Requirement};
use lode_core::utils::normalize_name;
use lode_core::{RegistryBindings, RegistryDirectory};
use lode_resolver::{cancellation, project_digest, synthesize, validate, ResolutionGraph, ResolveOptions, Resolver};

use super::CommandContext;

/// What the caller asked of one lock pass
#[derive(Debug, Clone, Default)]
pub struct LockRequest {
    /// Optional dependency groups to include
    pub extras: Vec<String>,
    /// Prefer the versions pinned in the current manifest
    pub keep_locked: bool,
    /// Overrides `LODE_TIMEOUT_SECS`
    pub timeout: Option<Duration>,
}

/// Everything resolution needs from a loaded project
pub struct ProjectInputs {
    pub directory: RegistryDirectory,
    pub bindings: RegistryBindings,
    pub requirements: Vec<Requirement>,
    pub extras: BTreeMap<String, Vec<Requirement>>,
    pub digest: String,
}

/// Bind the project's requirements against the configured registries.
///
/// `selected` names the optional groups the lock covers; each must exist.
pub async fn project_inputs(
    ctx: &CommandContext,
    loader: &ConfigLoader,
    project: &Project,
    selected: &[String],
) -> LodeResult<ProjectInputs> {
    let directory = loader.registry_directory(Some(project), &ctx.env).await?;
    let bindings = project.metadata.bindings(&directory)?;
    let requirements = project.metadata.requirements(&bindings)?;
    let extras = project.metadata.extras(&bindings)?;
    for group in selected {
        let wanted = normalize_name(group);
        if !extras.keys().any(|declared| normalize_name(declared) == wanted) {
            return Err(LodeError::invalid_metadata(
                "project.optional-dependencies",
                format!("{} has no optional group '{}'", project.metadata.name, group),
            ));
        }
    }
    let digest = project_digest(
        project.metadata.python_version(),
        &requirements,
        &extras,
        selected,
    );
    debug!(
        "Project {} has {} direct requirements and {} optional groups",
        project.metadata.name,
        requirements.len(),
        extras.len()
    );

    Ok(ProjectInputs {
        directory,
        bindings,
        requirements,
        extras,
        digest,
    })
}

/// Resolve a project and build its manifest without writing anything
pub async fn resolve_project(
    ctx: &CommandContext,
    loader: &ConfigLoader,
    project: &Project,
    request: &LockRequest,
) -> LodeResult<Manifest> {
    let inputs = project_inputs(ctx, loader, project, &request.extras).await?;

    let mut options = ResolveOptions::default().with_extras(&request.extras);
    let timeout = match request.timeout {
        Some(timeout) => Some(timeout),
        None => Settings::from_env(&ctx.env)?.timeout,
    };
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }
    if request.keep_locked {
        match read_manifest(&project.manifest_path).await? {
            Some(current) => options = options.with_preferred(current.locked_versions()),
            None => warn!("No manifest to keep versions from; resolving from scratch"),
        }
    }

    let (handle, signal) = cancellation();
    options = options.with_cancellation(signal);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let query = ctx.registry_query(&inputs.directory)?;
    let resolver = Resolver::new(query, inputs.bindings).with_options(options);
    ctx.output.info(&format!(
        "Resolving {} requirements for {}",
        inputs.requirements.len(),
        project.metadata.name
    ));
    let outcome = resolver.resolve(&inputs.requirements, &inputs.extras).await;
    interrupt.abort();
    let outcome = outcome?;

    ctx.output.success(&format!(
        "Resolved {} packages in {}ms ({} backtracks)",
        outcome.package_count, outcome.elapsed_ms, outcome.backtracks
    ));
    debug!(
        "Registry cache: {} hits, {} misses",
        outcome.cache.hits, outcome.cache.misses
    );
    for cycle in outcome.graph.cycles() {
        ctx.output
            .warn(&format!("Dependency cycle: {}", ResolutionGraph::format_cycle(&cycle)));
    }

    Ok(synthesize(
        &outcome.graph,
        &inputs.digest,
        project.metadata.python_version(),
    ))
}

/// Resolve and write `pyproject.lock`
pub async fn execute(request: LockRequest, ctx: &CommandContext) -> LodeResult<()> {
    let loader = ctx.loader();
    let project = loader.load_project().await?;
    info!("Locking project at {}", project.root);

    let manifest = resolve_project(ctx, &loader, &project, &request).await?;
    write_manifest(&project.manifest_path, &manifest)?;
    ctx.output.success(&format!(
        "Wrote {} ({} packages)",
        project.manifest_path,
        manifest.len()
    ));
    Ok(())
}

/// Fail unless the manifest matches the project and the selected groups
pub async fn check(extras: &[String], ctx: &CommandContext) -> LodeResult<()> {
    let loader = ctx.loader();
    let project = loader.load_project().await?;
    let inputs = project_inputs(ctx, &loader, &project, extras).await?;

    let Some(manifest) = read_manifest(&project.manifest_path).await? else {
        return Err(LodeError::invalid_manifest(
            "manifest",
            format!("{} does not exist", project.manifest_path),
        ));
    };

    match validate(&manifest, &inputs.digest) {
        Freshness::Fresh => {
            ctx.output
                .success(&format!("{} is up to date", project.manifest_path));
            Ok(())
        },
        Freshness::Stale => Err(LodeError::invalid_manifest(
            "manifest.project-hash",
            format!(
                "{} was locked for a different requirement set or extra selection",
                project.manifest_path
            ),
        )),
    }
}
