//! The metadata record published next to every package archive.
//!
//! A record is produced once per successful build and never changes
//! afterwards. It is identified by `(identifier, branch, timestamp)`; the
//! registry `version` string is derived from the branch and timestamp.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Branch, ProjectId, SchemaError};

/// Full metadata for a built package (`metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Project the package was built from.
    pub identifier: ProjectId,
    /// Branch the package was built from, as written in Git.
    pub branch: Branch,
    /// Registry version: `<normalized branch>-<timestamp>`.
    pub version: String,
    /// Archive modification time in whole seconds since the epoch.
    pub timestamp: i64,
    /// Commit the package was built from.
    #[serde(rename = "gitRevision", default)]
    pub git_revision: String,
    /// Build-time dependencies, frozen at build time.
    #[serde(default)]
    pub dependencies: BTreeMap<ProjectId, Branch>,
    /// Additional dependencies needed to run the package.
    #[serde(rename = "runtime-dependencies", default)]
    pub runtime_dependencies: BTreeMap<ProjectId, Branch>,
    /// Any further keys supplied when the package was published.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PackageMetadata {
    /// Create a record with no dependencies.
    pub fn new(identifier: ProjectId, branch: Branch, timestamp: i64, git_revision: &str) -> Self {
        Self {
            version: package_version(&branch, timestamp),
            identifier,
            branch,
            timestamp,
            git_revision: git_revision.to_string(),
            dependencies: BTreeMap::new(),
            runtime_dependencies: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Decode a record from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] if the bytes are not a valid record.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the record as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The lightweight projection used by the registry indices.
    pub fn record(&self) -> PackageRecord {
        PackageRecord {
            identifier: self.identifier.clone(),
            branch: self.branch.normalized(),
            version: self.version.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Registry version string for a branch and timestamp.
pub fn package_version(branch: &Branch, timestamp: i64) -> String {
    format!("{}-{timestamp}", branch.normalized())
}

/// What the registry knows about a package before fetching it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRecord {
    /// Project identifier.
    pub identifier: ProjectId,
    /// Normalized branch.
    pub branch: Branch,
    /// Registry version string.
    pub version: String,
    /// Creation time in seconds since the epoch.
    pub timestamp: i64,
}

impl PackageRecord {
    /// Build a record from a remote listing entry.
    ///
    /// The version is split on its last `-`: everything before is the
    /// normalized branch, everything after the timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidPackageVersion`] if the version has no
    /// `-` or the suffix is not an integer.
    pub fn from_listing(name: &str, version: &str) -> Result<Self, SchemaError> {
        let (branch, timestamp) = version
            .rsplit_once('-')
            .ok_or_else(|| SchemaError::InvalidPackageVersion(version.to_string()))?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| SchemaError::InvalidPackageVersion(version.to_string()))?;

        Ok(Self {
            identifier: ProjectId::new(name),
            branch: Branch::new(branch),
            version: version.to_string(),
            timestamp,
        })
    }

    /// Whether this record belongs to `identifier` on the (normalized) `branch`.
    pub fn is_for(&self, identifier: &ProjectId, branch: &Branch) -> bool {
        self.identifier == *identifier && self.branch == *branch
    }
}
