//! Shared types and wire formats for cibuild.
//!
//! Everything that crosses a process or file boundary lives here: platform
//! flavors, project descriptors from the metadata tree, dependency rulesets,
//! the typed project configuration and the package metadata record that is
//! published next to every build artifact.

pub mod config;
pub mod flavor;
pub mod metadata;
pub mod project;
pub mod types;

// Re-exports
pub use config::{Options, ProjectConfiguration};
pub use flavor::PlatformFlavor;
pub use metadata::{PackageMetadata, PackageRecord};
pub use project::{BranchRuleTable, DependencyRuleset, Project};
pub use types::*;

/// Flavor markers that match every platform.
pub const CATCH_ALL_FLAVORS: [&str; 2] = ["@all", "@everything"];

/// Name of the mainline branch. Always preferred when two branches compete.
pub const MAINLINE_BRANCH: &str = "master";
