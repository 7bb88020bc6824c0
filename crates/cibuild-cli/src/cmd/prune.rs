//! Prune command

use anyhow::{Context as _, Result};

use cibuild_core::registry::PrunePolicy;
use cibuild_schema::{Branch, PackageRecord, ProjectId};

use crate::context::Context;
use crate::ui;

pub async fn prune(
    ctx: &Context,
    remove_projects: &[String],
    remove_branches: &[String],
    dry_run: bool,
) -> Result<()> {
    let policy = PrunePolicy {
        remove_identifiers: remove_projects.iter().map(String::as_str).map(ProjectId::new).collect(),
        remove_branches: remove_branches.iter().map(String::as_str).map(Branch::new).collect(),
    };

    let mut registry = ctx.registry().await?;
    let removed = if dry_run {
        registry.stale_packages(&policy)
    } else {
        registry
            .prune(&policy)
            .await
            .context("Failed to prune package store")?
    };

    if removed.is_empty() {
        println!("Nothing to remove");
        return Ok(());
    }

    let mut table = ui::table(&["Project", "Version", "Built"]);
    for entry in &removed {
        let built = PackageRecord::from_listing(&entry.name, &entry.version)
            .map(|r| ui::format_timestamp(r.timestamp))
            .unwrap_or_default();
        table.add_row(vec![entry.name.clone(), entry.version.clone(), built]);
    }
    println!("{table}");

    let verb = if dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} packages", removed.len());
    Ok(())
}
