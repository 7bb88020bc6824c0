//! Shared command context.
//!
//! Combines the CI environment with command line overrides and builds the
//! core objects (resolver, configuration loader, registry) on demand.

use anyhow::{Context as _, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cibuild_core::env::{CiEnvironment, RefEnvironment};
use cibuild_core::store::{DirectoryStore, GitLabStore, RemoteStore};
use cibuild_core::{BranchResolver, ConfigLoader, MergeOptions, Registry};
use cibuild_schema::PlatformFlavor;

use crate::GlobalArgs;

/// Project descriptors inside the metadata checkout.
const PROJECTS_DIR: &str = "projects-invent";
/// Branch rule table inside the metadata checkout.
const BRANCH_RULES_FILE: &str = "branch-rules.yml";

#[derive(Debug, Clone)]
pub struct Context {
    pub env: CiEnvironment,
    pub flavor: PlatformFlavor,
    args: GlobalArgs,
}

impl Context {
    pub fn new(args: GlobalArgs) -> Result<Self> {
        let flavor = PlatformFlavor::new(&args.platform)
            .with_context(|| format!("Invalid platform '{}'", args.platform))?;
        Ok(Self {
            env: CiEnvironment::from_env(),
            flavor,
            args,
        })
    }

    fn metadata_path(&self) -> Result<&Path> {
        self.args
            .metadata
            .as_deref()
            .or(self.env.repo_metadata_path.as_deref())
            .context("No repository metadata: pass --metadata or set CIBUILD_REPO_METADATA_PATH")
    }

    /// Resolver over the metadata checkout, with `@same` answered from `repository`.
    pub fn resolver(&self, repository: &Path, refs: RefEnvironment) -> Result<BranchResolver> {
        let metadata = self.metadata_path()?;
        BranchResolver::load(
            &metadata.join(PROJECTS_DIR),
            &metadata.join(BRANCH_RULES_FILE),
            self.flavor.clone(),
            refs,
            repository,
        )
        .with_context(|| format!("Failed to load repository metadata from {}", metadata.display()))
    }

    pub fn config_loader(&self) -> Result<ConfigLoader> {
        let dir = self
            .args
            .config_dir
            .clone()
            .or_else(|| self.env.config_path.clone())
            .context("No configuration directory: pass --config-dir or set CIBUILD_CONFIG_PATH")?;
        Ok(ConfigLoader::new(dir).with_override(self.env.config_override_path.clone()))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.args
            .cache
            .clone()
            .unwrap_or_else(|| self.env.cache_path.clone())
    }

    fn store(&self) -> Result<Arc<dyn RemoteStore>> {
        if let Some(dir) = &self.args.store_dir {
            return Ok(Arc::new(DirectoryStore::new(dir)));
        }
        let Some(gitlab) = &self.env.gitlab else {
            bail!(
                "No package store: pass --store-dir or set CIBUILD_GITLAB_SERVER and CIBUILD_PACKAGE_PROJECT"
            );
        };
        Ok(Arc::new(GitLabStore::new(gitlab)?))
    }

    pub async fn registry(&self) -> Result<Registry> {
        let store = self.store()?;
        let cache = self.cache_path();
        Registry::open(&cache, store)
            .await
            .with_context(|| format!("Failed to open package registry (cache {})", cache.display()))
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            warn_on_overwrite: self.env.debug_overwritten_files,
            ..MergeOptions::default()
        }
    }
}
