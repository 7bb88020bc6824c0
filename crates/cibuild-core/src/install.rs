//! Laying fetched packages out into an install prefix.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use cibuild_schema::ProjectId;

use crate::archive::{self, ArchiveError};
use crate::merge::{MergeError, MergeOptions, MergeStats, merge_trees};
use crate::order::{OrderError, flatten_order, install_order};
use crate::registry::FetchedPackage;

/// Errors raised while installing packages.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Packages cannot be put in an install order.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A package was fetched without its payload.
    #[error("No payload for {0}: only metadata was fetched")]
    MissingPayload(ProjectId),

    /// A payload could not be unpacked.
    #[error("Failed to unpack {identifier}: {source}")]
    Archive {
        /// Package being unpacked.
        identifier: ProjectId,
        /// Underlying error.
        #[source]
        source: ArchiveError,
    },

    /// Merging into the prefix failed.
    #[error("Failed to install {identifier}: {source}")]
    Merge {
        /// Package being merged.
        identifier: String,
        /// Underlying error.
        #[source]
        source: MergeError,
    },

    /// Scratch space next to the prefix could not be set up.
    #[error("Failed to prepare {path}: {source}")]
    Io {
        /// Directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// One package placed in the prefix.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    /// Project identifier.
    pub identifier: ProjectId,
    /// Merge counters.
    pub stats: MergeStats,
}

/// Unpack and merge `fetched` into `prefix`, dependencies first.
///
/// Every payload is unpacked into a scratch directory beside the prefix so
/// that merging can move files instead of copying them. `preinstalled`
/// lists identifiers already present in the prefix.
///
/// # Errors
///
/// Returns an error if the packages cannot be ordered, a payload is missing
/// or cannot be unpacked, or merging fails.
pub fn install_packages(
    fetched: Vec<FetchedPackage>,
    prefix: &Path,
    preinstalled: &BTreeSet<ProjectId>,
    options: &MergeOptions,
) -> Result<Vec<InstalledPackage>, InstallError> {
    let ordered = flatten_order(install_order(fetched, preinstalled)?);

    // Validate first so a metadata-only fetch fails before anything is written
    if let Some(package) = ordered.iter().find(|p| p.payload.is_none()) {
        return Err(InstallError::MissingPayload(package.identifier.clone()));
    }

    let scratch_root = prefix.parent().unwrap_or(prefix);
    std::fs::create_dir_all(scratch_root).map_err(|source| InstallError::Io {
        path: scratch_root.to_path_buf(),
        source,
    })?;

    let moving = MergeOptions {
        moving_files: true,
        ..options.clone()
    };

    let mut installed = Vec::with_capacity(ordered.len());
    for package in ordered {
        let Some(payload) = package.payload.as_deref() else {
            return Err(InstallError::MissingPayload(package.identifier));
        };

        let scratch = tempfile::Builder::new()
            .prefix(".cibuild-unpack-")
            .tempdir_in(scratch_root)
            .map_err(|source| InstallError::Io {
                path: scratch_root.to_path_buf(),
                source,
            })?;

        tracing::info!("Installing {} ({})", package.identifier, package.branch);
        archive::extract(payload, scratch.path()).map_err(|source| InstallError::Archive {
            identifier: package.identifier.clone(),
            source,
        })?;
        let stats = merge_trees(scratch.path(), prefix, &moving).map_err(|source| InstallError::Merge {
            identifier: package.identifier.to_string(),
            source,
        })?;

        installed.push(InstalledPackage {
            identifier: package.identifier,
            stats,
        });
    }

    Ok(installed)
}

/// Where a prefix ends up inside a `DESTDIR` style staging root.
pub fn staged_prefix(staging_root: &Path, prefix: &Path) -> PathBuf {
    let relative: PathBuf = prefix
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    staging_root.join(relative)
}

/// Merge a staged installation back over the live `prefix`.
///
/// # Errors
///
/// Returns an error if the staged tree does not exist or merging fails.
pub fn deploy_staging(
    staging_root: &Path,
    prefix: &Path,
    options: &MergeOptions,
) -> Result<MergeStats, InstallError> {
    let staged = staged_prefix(staging_root, prefix);
    if !staged.is_dir() {
        return Err(InstallError::Io {
            path: staged,
            source: std::io::ErrorKind::NotFound.into(),
        });
    }

    tracing::info!("Deploying {} over {}", staged.display(), prefix.display());
    merge_trees(&staged, prefix, options).map_err(|source| InstallError::Merge {
        identifier: staged.display().to_string(),
        source,
    })
}
