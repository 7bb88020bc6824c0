//! Publish command

use anyhow::{Context as _, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use cibuild_core::resolver::ResolvedDependencies;
use cibuild_schema::Branch;

use super::resolve::project_dependencies;
use crate::ProjectArgs;
use crate::context::Context;

fn as_json(resolved: &ResolvedDependencies) -> Result<Value> {
    Ok(serde_json::to_value(resolved)?)
}

pub async fn publish(
    ctx: &Context,
    project: &ProjectArgs,
    archive: &Path,
    git_revision: Option<String>,
) -> Result<()> {
    let dependencies = project_dependencies(ctx, project)?;
    let git_revision = git_revision
        .or_else(|| ctx.env.commit_sha.clone())
        .unwrap_or_default();

    // Dependencies are frozen into the package as resolved right now
    let extra = BTreeMap::from([
        ("dependencies".to_string(), as_json(&dependencies.build)?),
        (
            "runtime-dependencies".to_string(),
            as_json(&dependencies.runtime)?,
        ),
        ("platform".to_string(), Value::from(ctx.flavor.to_string())),
    ]);

    let mut registry = ctx.registry().await?;
    let published = registry
        .upload(
            archive,
            &project.project.as_str().into(),
            &Branch::new(&project.branch),
            &git_revision,
            &extra,
        )
        .await
        .with_context(|| format!("Failed to publish {}", project.project))?;

    if published {
        println!("Published {} ({})", project.project, project.branch);
    } else {
        println!(
            "Nothing published: {} does not exist",
            archive.display()
        );
    }
    Ok(())
}
