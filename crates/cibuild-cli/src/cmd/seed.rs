//! Seed planning: the build order of a batch of projects.
//!
//! A seed file uses the same format as a project's `Dependencies` list.
//! Seed jobs build release branches, so `@same` is answered as for a
//! protected ref.

use anyhow::{Context as _, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use cibuild_core::env::RefEnvironment;
use cibuild_core::order::seed_order;
use cibuild_schema::{DependencyRuleset, ProjectId};

use crate::context::Context;
use crate::ui;

pub fn seed_plan(ctx: &Context, seed_file: &Path, workdir: &Path) -> Result<()> {
    let content = std::fs::read_to_string(seed_file)
        .with_context(|| format!("Failed to read seed file {}", seed_file.display()))?;
    let seed: Vec<DependencyRuleset> = serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid seed file {}", seed_file.display()))?;

    let resolver = ctx.resolver(workdir, RefEnvironment::protected())?;
    let loader = ctx.config_loader()?;

    let to_build = resolver.resolve(&seed, None);
    let mut dependencies: BTreeMap<ProjectId, BTreeSet<ProjectId>> = BTreeMap::new();
    for (identifier, branch) in &to_build {
        let configuration = loader
            .load(&workdir.join(identifier.as_str()), identifier)
            .with_context(|| format!("Failed to load configuration of {identifier}"))?;
        let deps = resolver.resolve(&configuration.dependencies, Some(branch));
        dependencies.insert(identifier.clone(), deps.into_keys().collect());
    }

    let order = seed_order(&dependencies)?;

    let mut table = ui::table(&["#", "Project", "Branch", "Waits for"]);
    for (position, identifier) in order.iter().enumerate() {
        let waits: Vec<&str> = dependencies
            .get(identifier)
            .into_iter()
            .flatten()
            .filter(|dep| to_build.contains_key(*dep))
            .map(ProjectId::as_str)
            .collect();
        let branch = to_build.get(identifier).map(ToString::to_string).unwrap_or_default();
        table.add_row(vec![
            (position + 1).to_string(),
            identifier.to_string(),
            branch,
            waits.join(", "),
        ]);
    }
    println!("{table}");
    Ok(())
}
