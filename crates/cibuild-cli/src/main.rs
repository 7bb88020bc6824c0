//! cibuild - dependency staging for multi-project CI builds

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cibuild_cli::context::Context;
use cibuild_cli::{Cli, Commands, cmd};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; -v only changes the default
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(cli.global)?;

    match cli.command {
        Commands::Resolve {
            project,
            runtime,
            json,
        } => cmd::resolve::resolve(&ctx, &project, runtime, json),
        Commands::Install {
            project,
            prefix,
            runtime,
            skip_deps,
            dry_run,
        } => cmd::install::install(&ctx, &project, &prefix, runtime, &skip_deps, dry_run).await,
        Commands::Merge {
            source,
            destination,
            skip,
            moving,
        } => cmd::tree::merge(&ctx, &source, &destination, skip, moving),
        Commands::Deploy { staging, prefix } => cmd::tree::deploy(&ctx, &staging, &prefix),
        Commands::Capture { root, archive } => cmd::tree::capture(&root, &archive),
        Commands::Publish {
            project,
            archive,
            git_revision,
        } => cmd::publish::publish(&ctx, &project, &archive, git_revision).await,
        Commands::ReverseDeps {
            workdir,
            branch,
            only,
        } => cmd::reverse_deps::reverse_deps(&ctx, &workdir, branch, &only),
        Commands::Prune {
            remove_projects,
            remove_branches,
            dry_run,
        } => cmd::prune::prune(&ctx, &remove_projects, &remove_branches, dry_run).await,
        Commands::SeedPlan {
            seed_file,
            workdir,
        } => cmd::seed::seed_plan(&ctx, &seed_file, &workdir),
    }
}
