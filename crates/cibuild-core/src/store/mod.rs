//! Remote package stores.
//!
//! A store keeps files under `(name, version, file)`. Every package has two
//! files, [`ARCHIVE_FILE`] and [`METADATA_FILE`]. The registry only talks to
//! stores through [`RemoteStore`], so a GitLab project and a plain directory
//! are interchangeable.

pub mod directory;
pub mod gitlab;

use async_trait::async_trait;
use thiserror::Error;

pub use directory::DirectoryStore;
pub use gitlab::GitLabStore;

/// Payload file name inside a package.
pub const ARCHIVE_FILE: &str = "archive.tar";

/// Metadata file name inside a package.
pub const METADATA_FILE: &str = "metadata.json";

/// One package version known to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Package name (the project identifier).
    pub name: String,
    /// Package version (`<normalized branch>-<timestamp>`).
    pub version: String,
    /// Store specific handle used for deletion.
    pub handle: String,
}

/// Errors raised by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested file does not exist.
    #[error("{name} {version}: {file} not found")]
    NotFound {
        /// Package name.
        name: String,
        /// Package version.
        version: String,
        /// File inside the package.
        file: String,
    },

    /// The configured server URL cannot be used.
    #[error("Invalid store URL '{0}'")]
    InvalidUrl(String),
}

/// A place packages are listed from, downloaded from and published to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human readable location, used in logs.
    fn location(&self) -> String;

    /// Every package version in the store.
    async fn list(&self) -> Result<Vec<StoreEntry>, StoreError>;

    /// Fetch one file of a package version.
    async fn download(&self, name: &str, version: &str, file: &str) -> Result<Vec<u8>, StoreError>;

    /// Store one file of a package version.
    async fn upload(
        &self,
        name: &str,
        version: &str,
        file: &str,
        content: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Remove a package version with all of its files.
    async fn delete(&self, entry: &StoreEntry) -> Result<(), StoreError>;
}
