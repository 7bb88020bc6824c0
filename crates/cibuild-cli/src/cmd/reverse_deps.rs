//! Reverse dependencies command

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

use cibuild_schema::{Branch, ProjectId};

use crate::context::Context;
use crate::ui;

pub fn reverse_deps(
    ctx: &Context,
    workdir: &Path,
    branch: Option<String>,
    only: &[String],
) -> Result<()> {
    let resolver = ctx.resolver(workdir, ctx.env.refs.clone())?;
    let loader = ctx.config_loader()?;
    let allow: Option<BTreeSet<ProjectId>> =
        (!only.is_empty()).then(|| only.iter().map(String::as_str).map(ProjectId::new).collect());
    let branch = branch.map(Branch::from);

    let reverse = resolver.reverse_dependencies(workdir, branch.as_ref(), &loader, allow.as_ref())?;

    let mut table = ui::table(&["Dependency", "Needed by"]);
    for (dependency, dependents) in &reverse {
        let names: Vec<&str> = dependents.iter().map(ProjectId::as_str).collect();
        table.add_row(vec![dependency.to_string(), names.join(", ")]);
    }
    println!("{table}");
    Ok(())
}
