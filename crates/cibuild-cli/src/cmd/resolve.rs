//! Resolve command

use anyhow::{Context as _, Result};
use cibuild_core::resolver::ResolvedDependencies;
use cibuild_schema::Branch;

use crate::ProjectArgs;
use crate::context::Context;
use crate::ui;

/// Resolved build and runtime dependencies of one project.
#[derive(Debug, Default)]
pub struct ProjectDependencies {
    pub build: ResolvedDependencies,
    pub runtime: ResolvedDependencies,
}

impl ProjectDependencies {
    /// Build dependencies, plus runtime ones when `runtime` is set.
    pub fn combined(&self, runtime: bool) -> ResolvedDependencies {
        let mut all = self.build.clone();
        if runtime {
            all.extend(self.runtime.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        all
    }
}

/// Load the configuration of `project` and resolve its dependency rulesets.
pub fn project_dependencies(ctx: &Context, project: &ProjectArgs) -> Result<ProjectDependencies> {
    let configuration = ctx
        .config_loader()?
        .load(&project.project_root, &project.project)
        .with_context(|| format!("Failed to load configuration of {}", project.project))?;
    let resolver = ctx.resolver(&project.project_root, ctx.env.refs.clone())?;

    let branch = Branch::new(&project.branch);
    Ok(ProjectDependencies {
        build: resolver.resolve(&configuration.dependencies, Some(&branch)),
        runtime: resolver.resolve(&configuration.runtime_dependencies, Some(&branch)),
    })
}

pub fn resolve(ctx: &Context, project: &ProjectArgs, runtime: bool, json: bool) -> Result<()> {
    let resolved = project_dependencies(ctx, project)?.combined(runtime);

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    if resolved.is_empty() {
        println!("{} has no dependencies on {}", project.project, ctx.flavor);
        return Ok(());
    }

    let mut table = ui::table(&["Dependency", "Branch"]);
    for (identifier, branch) in &resolved {
        table.add_row(vec![identifier.to_string(), branch.to_string()]);
    }
    println!("{table}");
    Ok(())
}
