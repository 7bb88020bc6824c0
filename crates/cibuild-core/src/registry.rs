//! Package registry: local cache in front of a remote store.
//!
//! Packages are immutable `(archive.tar, metadata.json)` pairs keyed by
//! identifier, normalized branch and timestamp. The newest package for an
//! `(identifier, branch)` pair always wins. Downloads land in the cache
//! directory as `<identifier>-<branch>.tar` / `.json` and are reused for as
//! long as no newer package appears.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cibuild_core::registry::Registry;
//! use cibuild_core::store::DirectoryStore;
//!
//! # async fn run() -> Result<(), cibuild_core::registry::RegistryError> {
//! let store = Arc::new(DirectoryStore::new("/srv/packages"));
//! let mut registry = Registry::open("/var/cache/cibuild".as_ref(), store).await?;
//! let found = registry.retrieve(&"kio".into(), &"master".into(), false).await?;
//! println!("{:?}", found.payload);
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use thiserror::Error;

use cibuild_schema::{Branch, PackageMetadata, PackageRecord, ProjectId, SchemaError};

use crate::expand::{ExpandError, Expansion};
use crate::order::Installable;
use crate::store::{ARCHIVE_FILE, METADATA_FILE, RemoteStore, StoreEntry, StoreError};

/// Errors raised by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The remote store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A cache or archive file could not be accessed.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Downloaded metadata could not be decoded.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Metadata could not be assembled.
    #[error("Invalid metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// A required dependency has no package.
    #[error("Unable to locate requested dependency in the registry: {identifier} (branch: {branch})")]
    MissingDependency {
        /// Missing project.
        identifier: ProjectId,
        /// Requested branch.
        branch: Branch,
    },

    /// Branch conflict during expansion.
    #[error(transparent)]
    Expand(#[from] ExpandError),
}

impl RegistryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a retrieved package came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the local cache.
    Hit,
    /// Payload and metadata were downloaded into the cache.
    Downloaded,
    /// Only the metadata was downloaded; nothing was cached.
    MetadataOnly,
    /// No package exists for the identifier and branch.
    Missing,
}

/// Result of [`Registry::retrieve`].
#[derive(Debug, Clone)]
pub struct Retrieved {
    /// Cached payload archive, when it was fetched.
    pub payload: Option<PathBuf>,
    /// Package metadata.
    pub metadata: Option<PackageMetadata>,
    /// How the package was obtained.
    pub status: CacheStatus,
}

impl Retrieved {
    fn missing() -> Self {
        Self {
            payload: None,
            metadata: None,
            status: CacheStatus::Missing,
        }
    }
}

/// A package fetched as part of a dependency expansion.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    /// Project identifier.
    pub identifier: ProjectId,
    /// Branch that was requested.
    pub branch: Branch,
    /// Payload archive (absent when only metadata was requested).
    pub payload: Option<PathBuf>,
    /// Package metadata.
    pub metadata: PackageMetadata,
}

impl Installable for FetchedPackage {
    fn identifier(&self) -> &ProjectId {
        &self.identifier
    }

    fn dependencies(&self) -> Vec<ProjectId> {
        self.metadata.dependencies.keys().cloned().collect()
    }
}

/// Which remote packages [`Registry::prune`] removes besides superseded ones.
#[derive(Debug, Clone, Default)]
pub struct PrunePolicy {
    /// Identifiers whose packages are always removed.
    pub remove_identifiers: BTreeSet<ProjectId>,
    /// Branches whose packages are always removed.
    pub remove_branches: BTreeSet<Branch>,
}

#[derive(Debug, Clone)]
struct RemotePackage {
    record: PackageRecord,
    entry: StoreEntry,
}

/// Local package cache backed by a [`RemoteStore`].
pub struct Registry {
    cache_dir: PathBuf,
    store: Arc<dyn RemoteStore>,
    cached: Vec<PackageMetadata>,
    remote: Vec<RemotePackage>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("cache_dir", &self.cache_dir)
            .field("store", &self.store.location())
            .field("cached", &self.cached.len())
            .field("remote", &self.remote.len())
            .finish()
    }
}

impl Registry {
    /// Index the cache directory and the remote store.
    ///
    /// The cache directory is created if needed. Unreadable cache entries
    /// and remote versions that do not parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or read,
    /// or the remote listing fails.
    pub async fn open(cache_dir: &Path, store: Arc<dyn RemoteStore>) -> Result<Self, RegistryError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| RegistryError::io(cache_dir, e))?;
        let cached = scan_cache(cache_dir)?;
        let remote = list_remote(store.as_ref()).await?;

        tracing::info!(
            "Registry: {} cached, {} remote packages ({})",
            cached.len(),
            remote.len(),
            store.location()
        );

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            store,
            cached,
            remote,
        })
    }

    /// Cache directory in use.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The remote store behind this registry.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Newest known package for `identifier` on `branch`, cached or remote.
    pub fn latest(&self, identifier: &ProjectId, branch: &Branch) -> Option<PackageRecord> {
        let branch = branch.normalized();
        let mut newest: Option<PackageRecord> = None;

        let candidates = self
            .remote
            .iter()
            .map(|p| p.record.clone())
            .chain(self.cached.iter().map(PackageMetadata::record));
        for record in candidates.filter(|r| r.is_for(identifier, &branch)) {
            if newest.as_ref().is_none_or(|n| record.timestamp > n.timestamp) {
                newest = Some(record);
            }
        }
        newest
    }

    fn cache_paths(&self, record: &PackageRecord) -> (PathBuf, PathBuf) {
        let stem = format!("{}-{}", record.identifier, record.branch);
        (
            self.cache_dir.join(format!("{stem}.tar")),
            self.cache_dir.join(format!("{stem}.json")),
        )
    }

    /// Fetch the newest package for `identifier` on `branch`.
    ///
    /// A cached copy of the newest package is used without contacting the
    /// store. With `only_metadata` the payload is never downloaded and the
    /// cache is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a download fails or the cache cannot be written.
    pub async fn retrieve(
        &mut self,
        identifier: &ProjectId,
        branch: &Branch,
        only_metadata: bool,
    ) -> Result<Retrieved, RegistryError> {
        let Some(latest) = self.latest(identifier, branch) else {
            tracing::debug!("No package for {identifier} ({branch})");
            return Ok(Retrieved::missing());
        };
        let (payload_path, metadata_path) = self.cache_paths(&latest);

        let hit = self.cached.iter().find(|m| {
            let record = m.record();
            record.is_for(identifier, &latest.branch) && record.timestamp == latest.timestamp
        });
        let has_payload = payload_path.is_file();
        if let Some(metadata) = hit.filter(|_| only_metadata || has_payload) {
            tracing::info!("Cache hit: {identifier} {}", latest.version);
            return Ok(Retrieved {
                payload: has_payload.then_some(payload_path),
                metadata: Some(metadata.clone()),
                status: CacheStatus::Hit,
            });
        }

        tracing::info!("Downloading metadata: {identifier} {}", latest.version);
        let metadata_bytes = self
            .store
            .download(identifier, &latest.version, METADATA_FILE)
            .await?;
        let metadata = PackageMetadata::from_slice(&metadata_bytes)?;
        if only_metadata {
            return Ok(Retrieved {
                payload: None,
                metadata: Some(metadata),
                status: CacheStatus::MetadataOnly,
            });
        }

        tracing::info!("Downloading payload: {identifier} {}", latest.version);
        let payload_bytes = self
            .store
            .download(identifier, &latest.version, ARCHIVE_FILE)
            .await?;

        self.write_cache_file(&payload_path, &payload_bytes)?;
        self.write_cache_file(&metadata_path, &metadata_bytes)?;

        self.cached
            .retain(|m| !m.record().is_for(identifier, &latest.branch));
        self.cached.push(metadata.clone());

        Ok(Retrieved {
            payload: Some(payload_path),
            metadata: Some(metadata),
            status: CacheStatus::Downloaded,
        })
    }

    fn write_cache_file(&self, path: &Path, content: &[u8]) -> Result<(), RegistryError> {
        let mut file =
            NamedTempFile::new_in(&self.cache_dir).map_err(|e| RegistryError::io(&self.cache_dir, e))?;
        file.write_all(content)
            .map_err(|e| RegistryError::io(file.path(), e))?;
        file.persist(path)
            .map_err(|e| RegistryError::io(path, e.error))?;
        Ok(())
    }

    /// Fetch `initial` and everything it transitively depends on.
    ///
    /// Every identifier is fetched once. When dependents disagree on a
    /// branch, the newer branch is used.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingDependency`] if any package cannot be
    /// found, or another error if fetching fails.
    pub async fn retrieve_dependencies(
        &mut self,
        initial: &BTreeMap<ProjectId, Branch>,
        runtime: bool,
        only_metadata: bool,
    ) -> Result<Vec<FetchedPackage>, RegistryError> {
        let mut expansion = Expansion::new(initial.clone());
        let mut fetched: Vec<FetchedPackage> = Vec::new();

        while let Some((identifier, branch)) = expansion.next() {
            let missing = || RegistryError::MissingDependency {
                identifier: identifier.clone(),
                branch: branch.clone(),
            };

            let retrieved = match self.retrieve(&identifier, &branch, only_metadata).await {
                Ok(retrieved) => retrieved,
                Err(RegistryError::Store(StoreError::NotFound { .. })) => return Err(missing()),
                Err(e) => return Err(e),
            };
            let metadata = retrieved.metadata.ok_or_else(missing)?;

            expansion.record(&identifier, &branch, &metadata, runtime)?;
            let package = FetchedPackage {
                identifier,
                branch,
                payload: retrieved.payload,
                metadata,
            };
            match fetched.iter_mut().find(|p| p.identifier == package.identifier) {
                Some(previous) => {
                    tracing::debug!(
                        "Replacing {} ({}) with {}",
                        previous.identifier,
                        previous.branch,
                        package.branch
                    );
                    *previous = package;
                }
                None => fetched.push(package),
            }
        }

        Ok(fetched)
    }

    /// Build the metadata record for a freshly built archive.
    ///
    /// The timestamp is the archive's modification time. Keys of `extra`
    /// are added on top and may replace the standard fields.
    ///
    /// Returns `None` if the archive does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be inspected or `extra` does
    /// not fit the metadata schema.
    pub fn generate_metadata(
        archive: &Path,
        identifier: &ProjectId,
        branch: &Branch,
        git_revision: &str,
        extra: &BTreeMap<String, Value>,
    ) -> Result<Option<PackageMetadata>, RegistryError> {
        if !archive.exists() {
            return Ok(None);
        }

        let modified = std::fs::metadata(archive)
            .and_then(|m| m.modified())
            .map_err(|e| RegistryError::io(archive, e))?;
        let timestamp = modified
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);

        let metadata =
            PackageMetadata::new(identifier.clone(), branch.clone(), timestamp, git_revision);
        if extra.is_empty() {
            return Ok(Some(metadata));
        }

        let mut value = serde_json::to_value(&metadata)?;
        if let Value::Object(fields) = &mut value {
            fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Publish `archive` as the newest package of `identifier` on `branch`.
    ///
    /// Uploads the archive first, then its metadata. Returns `false` without
    /// contacting the store if the archive does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or an upload fails.
    pub async fn upload(
        &mut self,
        archive: &Path,
        identifier: &ProjectId,
        branch: &Branch,
        git_revision: &str,
        extra: &BTreeMap<String, Value>,
    ) -> Result<bool, RegistryError> {
        let Some(metadata) = Self::generate_metadata(archive, identifier, branch, git_revision, extra)?
        else {
            tracing::warn!("Not publishing {identifier}: {} does not exist", archive.display());
            return Ok(false);
        };

        let payload = tokio::fs::read(archive)
            .await
            .map_err(|e| RegistryError::io(archive, e))?;
        tracing::info!("Publishing {identifier} {} ({} bytes)", metadata.version, payload.len());

        self.store
            .upload(identifier, &metadata.version, ARCHIVE_FILE, payload)
            .await?;
        self.store
            .upload(
                identifier,
                &metadata.version,
                METADATA_FILE,
                metadata.to_json()?.into_bytes(),
            )
            .await?;

        // The store assigns deletion handles, so re-list to pick them up
        self.remote = list_remote(self.store.as_ref()).await?;
        Ok(true)
    }

    /// Remote packages that `policy` (or a newer package) makes obsolete.
    ///
    /// For every `(identifier, branch)` only the newest package survives.
    /// Packages of listed identifiers or branches never survive.
    pub fn stale_packages(&self, policy: &PrunePolicy) -> Vec<StoreEntry> {
        let remove_branches: BTreeSet<Branch> =
            policy.remove_branches.iter().map(Branch::normalized).collect();
        let mut newest: BTreeMap<(ProjectId, Branch), &RemotePackage> = BTreeMap::new();
        let mut stale = Vec::new();

        for package in &self.remote {
            let record = &package.record;
            if policy.remove_identifiers.contains(&record.identifier)
                || remove_branches.contains(&record.branch)
            {
                stale.push(package.entry.clone());
                continue;
            }

            let key = (record.identifier.clone(), record.branch.clone());
            match newest.get(&key) {
                Some(known) if known.record.timestamp > record.timestamp => {
                    stale.push(package.entry.clone());
                }
                Some(known) => {
                    stale.push(known.entry.clone());
                    newest.insert(key, package);
                }
                None => {
                    newest.insert(key, package);
                }
            }
        }

        stale
    }

    /// Delete every package returned by [`Self::stale_packages`].
    ///
    /// Deletions run one after the other; the first failure stops the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a deletion fails.
    pub async fn prune(&mut self, policy: &PrunePolicy) -> Result<Vec<StoreEntry>, RegistryError> {
        let stale = self.stale_packages(policy);
        for entry in &stale {
            tracing::info!("Removing: {} - {}", entry.name, entry.version);
            self.store.delete(entry).await?;
            self.remote.retain(|p| p.entry != *entry);
        }
        Ok(stale)
    }
}

async fn list_remote(store: &dyn RemoteStore) -> Result<Vec<RemotePackage>, RegistryError> {
    let mut remote = Vec::new();
    for entry in store.list().await? {
        match PackageRecord::from_listing(&entry.name, &entry.version) {
            Ok(record) => remote.push(RemotePackage { record, entry }),
            Err(e) => tracing::warn!("Skipping remote package {}: {e}", entry.name),
        }
    }
    Ok(remote)
}

fn scan_cache(cache_dir: &Path) -> Result<Vec<PackageMetadata>, RegistryError> {
    let mut cached = Vec::new();
    let entries = std::fs::read_dir(cache_dir).map_err(|e| RegistryError::io(cache_dir, e))?;

    for entry in entries {
        let path = entry.map_err(|e| RegistryError::io(cache_dir, e))?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let parsed = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| PackageMetadata::from_slice(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(metadata) => cached.push(metadata),
            Err(e) => tracing::warn!("Ignoring cache entry {}: {e}", path.display()),
        }
    }

    Ok(cached)
}
