//! Status command: manifest freshness and the dependent-of relation

use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::Serialize;

use lode_config::read_manifest;
use lode_core::error::{LodeError, LodeResult};
use lode_core::types::{Freshness, Manifest, PackageIdentity};
use lode_resolver::{dependency_paths, status, validate};

use super::lock::project_inputs;
use super::CommandContext;

#[derive(Debug, Serialize)]
struct StatusReport {
    project: String,
    manifest: String,
    fresh: bool,
    packages: Vec<PackageStatus>,
}

#[derive(Debug, Serialize)]
struct PackageStatus {
    name: String,
    registry: String,
    version: String,
    direct: bool,
    required_by: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WhyReport {
    package: String,
    paths: Vec<Vec<String>>,
}

/// Show freshness and who requires what, or explain one package
pub async fn execute(
    environment: Option<PathBuf>,
    why: Option<String>,
    json: bool,
    extras: &[String],
    ctx: &CommandContext,
) -> LodeResult<()> {
    let loader = match environment {
        Some(dir) => ctx.loader_at(environment_dir(ctx, dir)?),
        None => ctx.loader(),
    };
    let project = loader.load_project().await?;
    let inputs = project_inputs(ctx, &loader, &project, extras).await?;

    let Some(manifest) = read_manifest(&project.manifest_path).await? else {
        ctx.output.warn(&format!(
            "{} has no manifest yet; run 'lode lock'",
            project.metadata.name
        ));
        return Ok(());
    };
    let freshness = validate(&manifest, &inputs.digest);

    match why {
        Some(package) => explain(&manifest, &package, json, ctx),
        None => report(&manifest, freshness, &project.metadata.name, json, ctx),
    }
}

fn environment_dir(ctx: &CommandContext, dir: PathBuf) -> LodeResult<Utf8PathBuf> {
    let dir = Utf8PathBuf::try_from(dir).map_err(|e| {
        LodeError::configuration("environment", format!("Path is not UTF-8: {}", e))
    })?;
    Ok(if dir.is_absolute() {
        dir
    } else {
        ctx.cwd.join(dir)
    })
}

fn report(
    manifest: &Manifest,
    freshness: Freshness,
    project: &str,
    json: bool,
    ctx: &CommandContext,
) -> LodeResult<()> {
    let relation = status(manifest);

    if json {
        let packages = manifest
            .dependencies
            .iter()
            .map(|entry| PackageStatus {
                name: entry.identity.name().to_string(),
                registry: entry.identity.registry().alias.clone(),
                version: entry.version.to_string(),
                direct: entry.direct,
                required_by: relation
                    .get(&entry.identity)
                    .map(|parents| parents.iter().map(PackageIdentity::label).collect())
                    .unwrap_or_default(),
            })
            .collect();
        let report = StatusReport {
            project: project.to_string(),
            manifest: manifest.tool_version.clone(),
            fresh: freshness == Freshness::Fresh,
            packages,
        };
        return print_json(&report, ctx);
    }

    match freshness {
        Freshness::Fresh => ctx.output.success("Manifest is up to date"),
        Freshness::Stale => ctx
            .output
            .warn("Manifest is stale; run 'lode lock' to update it"),
    }
    let colors = ctx.output.colors();
    for entry in &manifest.dependencies {
        let pin = format!("{} {}", entry.identity.label(), entry.version);
        let line = match relation.get(&entry.identity) {
            Some(parents) if !parents.is_empty() => {
                let labels: Vec<String> = parents.iter().map(PackageIdentity::label).collect();
                format!("{} {}", pin, colors.dim(&format!("<- {}", labels.join(", "))))
            },
            _ => pin,
        };
        let marker = if entry.direct { "*" } else { " " };
        ctx.output.step(marker, &line);
    }
    ctx.output.info(&format!(
        "{} packages, * marks direct dependencies",
        manifest.len()
    ));
    Ok(())
}

fn explain(manifest: &Manifest, package: &str, json: bool, ctx: &CommandContext) -> LodeResult<()> {
    let entries = manifest.entries_named(package);
    if entries.is_empty() {
        ctx.output
            .warn(&format!("'{}' is not in the manifest", package));
        return Ok(());
    }

    let mut reports = Vec::new();
    for entry in entries {
        let paths: Vec<Vec<String>> = dependency_paths(manifest, &entry.identity)
            .iter()
            .map(|path| path.iter().map(PackageIdentity::label).collect())
            .collect();
        reports.push(WhyReport {
            package: entry.identity.label(),
            paths,
        });
    }

    if json {
        return print_json(&reports, ctx);
    }
    for report in &reports {
        ctx.output.line(&format!("{}:", report.package));
        for path in &report.paths {
            ctx.output
                .line(&format!("  project -> {}", path.join(" -> ")));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, ctx: &CommandContext) -> LodeResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| LodeError::io("Failed to render JSON".to_string(), e.into()))?;
    ctx.output.line(&rendered);
    Ok(())
}
