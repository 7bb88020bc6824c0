//! Typed project CI configuration.
//!
//! The configuration is assembled from several YAML layers (see the loader
//! in `cibuild-core`) and decoded into these structs exactly once, so the
//! rest of the code works on typed fields instead of string lookups.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::project::DependencyRuleset;

/// The merged CI configuration of one project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfiguration {
    /// Build and test switches.
    #[serde(rename = "Options", default)]
    pub options: Options,
    /// Build-time dependency rulesets.
    #[serde(rename = "Dependencies", default)]
    pub dependencies: Vec<DependencyRuleset>,
    /// Rulesets for dependencies only needed at run time.
    #[serde(rename = "RuntimeDependencies", default)]
    pub runtime_dependencies: Vec<DependencyRuleset>,
    /// Extra environment variables for the build.
    #[serde(rename = "Environment", default)]
    pub environment: BTreeMap<String, String>,
    /// Scripts run after the project has been installed.
    #[serde(rename = "PostInstallScripts", default)]
    pub post_install_scripts: Vec<String>,
}

/// The `Options` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Options {
    /// Run the project's tests.
    pub run_tests: bool,
    /// Build inside the source tree.
    pub in_source_build: bool,
    /// Use ccache when available.
    pub use_ccache: bool,
    /// Run tests before installing instead of after.
    pub test_before_installing: bool,
    /// Flavors on which failing tests fail the build.
    pub require_passing_tests_on: Vec<String>,
    /// Extra CMake arguments.
    pub cmake_options: String,
    /// Timeout for a single test, in seconds.
    pub per_test_timeout: u64,
    /// Collect coverage with gcovr.
    pub run_gcovr: bool,
    /// Extra gcovr arguments.
    pub gcovr_arguments: String,
    /// Options this schema does not know about.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            run_tests: true,
            in_source_build: false,
            use_ccache: true,
            test_before_installing: false,
            require_passing_tests_on: Vec::new(),
            cmake_options: String::new(),
            per_test_timeout: 60,
            run_gcovr: true,
            gcovr_arguments: String::new(),
            other: BTreeMap::new(),
        }
    }
}
