//! Install command: fetch the dependencies of a project and lay them out.

use anyhow::{Context as _, Result};
use std::collections::BTreeSet;
use std::path::Path;

use cibuild_core::install::install_packages;
use cibuild_core::order::install_order;
use cibuild_schema::ProjectId;

use super::resolve::project_dependencies;
use crate::ProjectArgs;
use crate::context::Context;
use crate::ui;

pub async fn install(
    ctx: &Context,
    project: &ProjectArgs,
    prefix: &Path,
    runtime: bool,
    skip_deps: &[String],
    dry_run: bool,
) -> Result<()> {
    let preinstalled: BTreeSet<ProjectId> = skip_deps.iter().map(String::as_str).map(ProjectId::new).collect();

    let mut wanted = project_dependencies(ctx, project)?.combined(runtime);
    wanted.retain(|identifier, _| !preinstalled.contains(identifier));
    if wanted.is_empty() {
        println!("Nothing to install for {}", project.project);
        return Ok(());
    }

    let mut registry = ctx.registry().await?;
    let mut fetched = registry
        .retrieve_dependencies(&wanted, runtime, dry_run)
        .await
        .context("Failed to fetch dependencies")?;
    fetched.retain(|package| !preinstalled.contains(&package.identifier));

    if dry_run {
        let batches = install_order(fetched, &preinstalled)?;
        let mut table = ui::table(&["Step", "Project", "Branch", "Built"]);
        for (step, batch) in batches.iter().enumerate() {
            for package in batch {
                table.add_row(vec![
                    (step + 1).to_string(),
                    package.identifier.to_string(),
                    package.branch.to_string(),
                    ui::format_timestamp(package.metadata.timestamp),
                ]);
            }
        }
        println!("{table}");
        return Ok(());
    }

    let installed = install_packages(fetched, prefix, &preinstalled, &ctx.merge_options())
        .with_context(|| format!("Failed to install into {}", prefix.display()))?;

    let unexpected: usize = installed
        .iter()
        .map(|p| p.stats.unexpected_overwrites.len())
        .sum();
    println!(
        "Installed {} packages into {}",
        installed.len(),
        prefix.display()
    );
    if unexpected > 0 {
        tracing::warn!("{unexpected} files were overwritten by later packages");
    }
    Ok(())
}
