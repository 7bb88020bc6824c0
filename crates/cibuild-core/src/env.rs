//! Inputs taken from the CI environment.
//!
//! Everything the core reads from environment variables is collected here
//! once, so the rest of the library receives plain values and can be driven
//! from tests without touching the process environment.

use dirs::cache_dir;
use std::path::PathBuf;

use cibuild_schema::Branch;

/// Values that decide how `@same` resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefEnvironment {
    /// The ref being built is protected (a mainline or release branch).
    pub protected: bool,
    /// Target branch of the merge request being built, if any.
    pub merge_request_target: Option<Branch>,
}

impl RefEnvironment {
    /// Read `CI_COMMIT_REF_PROTECTED` and `CI_MERGE_REQUEST_TARGET_BRANCH_NAME`.
    pub fn from_env() -> Self {
        Self {
            protected: std::env::var("CI_COMMIT_REF_PROTECTED").is_ok_and(|v| v == "true"),
            merge_request_target: std::env::var("CI_MERGE_REQUEST_TARGET_BRANCH_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .map(Branch::from),
        }
    }

    /// Environment of a protected ref.
    pub fn protected() -> Self {
        Self {
            protected: true,
            merge_request_target: None,
        }
    }
}

/// Connection details for the GitLab package registry.
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// Server base URL (e.g. `https://invent.kde.org`).
    pub server: String,
    /// API token; only needed for publishing and pruning.
    pub token: Option<String>,
    /// Project path or numeric id holding the packages.
    pub package_project: String,
    /// Ask the server for compressed payload downloads.
    pub compress_downloads: bool,
}

impl GitLabConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` unless both `CIBUILD_GITLAB_SERVER` and
    /// `CIBUILD_PACKAGE_PROJECT` are set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            server: std::env::var("CIBUILD_GITLAB_SERVER").ok()?,
            package_project: std::env::var("CIBUILD_PACKAGE_PROJECT").ok()?,
            token: std::env::var("CIBUILD_GITLAB_TOKEN").ok(),
            compress_downloads: env_flag("CIBUILD_COMPRESS_PACKAGES_ON_DOWNLOAD"),
        })
    }
}

/// Everything a build invocation takes from its environment.
#[derive(Debug, Clone)]
pub struct CiEnvironment {
    /// Commit being built, recorded as `gitRevision` when publishing.
    pub commit_sha: Option<String>,
    /// Ref protection and merge request information.
    pub refs: RefEnvironment,
    /// Local package cache directory.
    pub cache_path: PathBuf,
    /// Remote registry, when configured.
    pub gitlab: Option<GitLabConfig>,
    /// Warn about unexpected overwrites while merging install trees.
    pub debug_overwritten_files: bool,
    /// Root of the repository metadata checkout.
    pub repo_metadata_path: Option<PathBuf>,
    /// Directory holding `global.yml` and per-project overrides.
    pub config_path: Option<PathBuf>,
    /// Final configuration layer applied on top of everything else.
    pub config_override_path: Option<PathBuf>,
}

impl CiEnvironment {
    /// Collect the environment of the current process.
    pub fn from_env() -> Self {
        Self {
            commit_sha: std::env::var("CI_COMMIT_SHA").ok(),
            refs: RefEnvironment::from_env(),
            cache_path: std::env::var_os("CIBUILD_CACHE_PATH")
                .map_or_else(default_cache_path, PathBuf::from),
            gitlab: GitLabConfig::from_env(),
            debug_overwritten_files: env_flag("CIBUILD_DEBUG_OVERWRITTEN_FILES"),
            repo_metadata_path: std::env::var_os("CIBUILD_REPO_METADATA_PATH").map(PathBuf::from),
            config_path: std::env::var_os("CIBUILD_CONFIG_PATH").map(PathBuf::from),
            config_override_path: std::env::var_os("CIBUILD_GLOBAL_CONFIG_OVERRIDE_PATH")
                .map(PathBuf::from),
        }
    }
}

/// Default package cache: `<user cache dir>/cibuild/packages`.
pub fn default_cache_path() -> PathBuf {
    cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cibuild")
        .join("packages")
}

/// Read a boolean switch the way CI variables are usually written.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "t" | "y" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for yes in ["1", "true", "True", "t", "Y", "yes"] {
            assert!(parse_flag(yes), "{yes}");
        }
        for no in ["", "0", "false", "no", "off"] {
            assert!(!parse_flag(no), "{no}");
        }
    }

    #[test]
    fn test_default_cache_path_is_namespaced() {
        assert!(default_cache_path().ends_with("cibuild/packages"));
    }
}
