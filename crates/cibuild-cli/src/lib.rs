//! cibuild - dependency staging for multi-project CI builds
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Thin front end over `cibuild-core`. Every command reads its defaults
//! from the CI environment (see [`cibuild_core::env`]) and lets flags
//! override them.
//!
//! # Typical job
//!
//! ```text
//! cibuild install kio --branch master --prefix /opt/kde   # fetch + lay out deps
//! ...build and install into $DESTDIR...
//! cibuild capture $DESTDIR/opt/kde build/kio.tar
//! cibuild publish kio build/kio.tar --branch master
//! ```

pub mod cmd;
pub mod context;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cibuild")]
#[command(author, version, about = "cibuild - dependency staging for multi-project CI builds")]
pub struct Cli {
    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Locations and platform shared by all commands.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Platform flavor, e.g. Linux/Qt6
    #[arg(long, global = true, env = "CIBUILD_PLATFORM", default_value = "Linux")]
    pub platform: String,

    /// Repository metadata checkout (holds projects-invent/ and branch-rules.yml)
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Directory holding global.yml and per-project configuration
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Local package cache
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Use a directory as the package store instead of GitLab
    #[arg(long, global = true, env = "CIBUILD_PACKAGE_DIRECTORY")]
    pub store_dir: Option<PathBuf>,
}

/// Project, branch and checkout a command works on.
#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    /// Project identifier
    pub project: String,

    /// Branch being built
    #[arg(long, short, env = "CI_COMMIT_REF_NAME")]
    pub branch: String,

    /// Project checkout (used for .ci.yml and @same resolution)
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the dependencies of a project to branches
    Resolve {
        #[command(flatten)]
        project: ProjectArgs,
        /// Include runtime dependencies
        #[arg(long)]
        runtime: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Fetch dependencies and install them into a prefix
    Install {
        #[command(flatten)]
        project: ProjectArgs,
        /// Install prefix
        #[arg(long)]
        prefix: PathBuf,
        /// Include runtime dependencies
        #[arg(long)]
        runtime: bool,
        /// Identifiers already present in the prefix
        #[arg(long, num_args = 1..)]
        skip_deps: Vec<String>,
        /// Only fetch metadata and print the install order
        #[arg(long)]
        dry_run: bool,
    },
    /// Merge one directory tree into another
    Merge {
        /// Tree to merge from
        source: PathBuf,
        /// Tree to merge into
        destination: PathBuf,
        /// Relative paths to leave out (repeatable)
        #[arg(long = "skip")]
        skip: Vec<PathBuf>,
        /// Move files instead of copying them
        #[arg(long = "move")]
        moving: bool,
    },
    /// Merge a staged installation over the live prefix
    Deploy {
        /// Staging root (DESTDIR)
        staging: PathBuf,
        /// Live install prefix
        #[arg(long)]
        prefix: PathBuf,
    },
    /// Write an install tree into a package archive
    Capture {
        /// Tree to archive
        root: PathBuf,
        /// Archive to create
        archive: PathBuf,
    },
    /// Publish a package archive to the registry
    Publish {
        #[command(flatten)]
        project: ProjectArgs,
        /// Archive to publish
        archive: PathBuf,
        /// Commit the archive was built from
        #[arg(long, env = "CI_COMMIT_SHA")]
        git_revision: Option<String>,
    },
    /// Show which projects in a working directory depend on what
    #[command(name = "reverse-deps")]
    ReverseDeps {
        /// Directory holding ext_* project checkouts
        #[arg(default_value = ".")]
        workdir: PathBuf,
        /// Branch used for resolution
        #[arg(long, short)]
        branch: Option<String>,
        /// Restrict to these projects
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },
    /// Remove superseded packages from the remote store
    Prune {
        /// Projects whose packages are always removed
        #[arg(long = "remove-project")]
        remove_projects: Vec<String>,
        /// Branches whose packages are always removed
        #[arg(long = "remove-branch")]
        remove_branches: Vec<String>,
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Order the projects of a seed file for building
    #[command(name = "seed-plan")]
    SeedPlan {
        /// Seed file (a Dependencies-style list of rulesets)
        seed_file: PathBuf,
        /// Directory holding one checkout per project identifier
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
}
