//! Tree commands: merge, deploy and capture.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use cibuild_core::archive;
use cibuild_core::install::deploy_staging;
use cibuild_core::merge::{MergeOptions, merge_trees};

use crate::context::Context;

pub fn merge(
    ctx: &Context,
    source: &Path,
    destination: &Path,
    skip_paths: Vec<PathBuf>,
    moving_files: bool,
) -> Result<()> {
    let options = MergeOptions {
        moving_files,
        skip_paths,
        ..ctx.merge_options()
    };
    let stats = merge_trees(source, destination, &options).with_context(|| {
        format!(
            "Failed to merge {} into {}",
            source.display(),
            destination.display()
        )
    })?;
    println!(
        "Merged {}: {} new, {} overwritten",
        source.display(),
        stats.copied,
        stats.overwritten
    );
    Ok(())
}

pub fn deploy(ctx: &Context, staging: &Path, prefix: &Path) -> Result<()> {
    let stats = deploy_staging(staging, prefix, &ctx.merge_options())
        .with_context(|| format!("Failed to deploy {}", staging.display()))?;
    println!(
        "Deployed into {}: {} new, {} overwritten",
        prefix.display(),
        stats.copied,
        stats.overwritten
    );
    Ok(())
}

pub fn capture(root: &Path, archive_path: &Path) -> Result<()> {
    archive::capture(root, archive_path)
        .with_context(|| format!("Failed to archive {}", root.display()))?;
    println!("Wrote {}", archive_path.display());
    Ok(())
}
