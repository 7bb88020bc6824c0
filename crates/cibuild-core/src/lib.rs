//! Core of the cibuild orchestrator.
//!
//! Resolves dependency rulesets into concrete branches, fetches and
//! publishes build artifacts through a cached registry, and merges those
//! artifacts into an install prefix.

pub mod archive;
pub mod config;
pub mod env;
pub mod expand;
pub mod git;
pub mod install;
pub mod merge;
pub mod order;
pub mod registry;
pub mod resolver;
pub mod store;

pub use config::ConfigLoader;
pub use env::CiEnvironment;
pub use merge::{MergeOptions, merge_trees};
pub use registry::{FetchedPackage, Registry};
pub use resolver::BranchResolver;
pub use store::RemoteStore;

/// User Agent string for store requests
pub const USER_AGENT: &str = concat!("cibuild/", env!("CARGO_PKG_VERSION"));
