//! Install and seed ordering.
//!
//! Ordering is done in rounds: every package whose dependencies are all
//! satisfied is taken out as one batch, until nothing is left. A round that
//! takes nothing means a cycle or a dependency that will never arrive.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use cibuild_schema::ProjectId;

/// Something that can be placed in an install order.
pub trait Installable {
    /// Identifier of the package.
    fn identifier(&self) -> &ProjectId;

    /// Identifiers that must be installed first.
    fn dependencies(&self) -> Vec<ProjectId>;
}

/// Errors raised while ordering.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrderError {
    /// No remaining package can be installed.
    #[error("Cannot order {remaining:?}: dependency cycle or missing package")]
    Stalled {
        /// Packages left over, sorted.
        remaining: Vec<ProjectId>,
    },
}

/// Split `packages` into batches that can be installed one after the other.
///
/// A dependency counts as satisfied once it is installed by an earlier batch
/// or listed in `preinstalled`. Batch members are sorted by identifier.
///
/// # Errors
///
/// Returns [`OrderError::Stalled`] when a round makes no progress.
pub fn install_order<T: Installable>(
    packages: Vec<T>,
    preinstalled: &BTreeSet<ProjectId>,
) -> Result<Vec<Vec<T>>, OrderError> {
    let mut remaining = packages;
    let mut installed = preinstalled.clone();
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let (mut ready, blocked): (Vec<T>, Vec<T>) = remaining.into_iter().partition(|package| {
            package
                .dependencies()
                .iter()
                .all(|dep| installed.contains(dep))
        });

        if ready.is_empty() {
            let mut remaining: Vec<ProjectId> =
                blocked.iter().map(|p| p.identifier().clone()).collect();
            remaining.sort();
            return Err(OrderError::Stalled { remaining });
        }

        ready.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        installed.extend(ready.iter().map(|p| p.identifier().clone()));
        tracing::debug!(
            "Install batch: {:?}",
            ready.iter().map(|p| p.identifier().as_str()).collect::<Vec<_>>()
        );
        batches.push(ready);
        remaining = blocked;
    }

    Ok(batches)
}

/// Flatten batches into a single install sequence.
pub fn flatten_order<T>(batches: Vec<Vec<T>>) -> Vec<T> {
    batches.into_iter().flatten().collect()
}

/// Order a batch of projects to build from scratch.
///
/// Unlike [`install_order`], a project only waits for dependencies that are
/// part of the batch; everything else is assumed to be available already.
///
/// # Errors
///
/// Returns [`OrderError::Stalled`] on a dependency cycle inside the batch.
pub fn seed_order(
    projects: &BTreeMap<ProjectId, BTreeSet<ProjectId>>,
) -> Result<Vec<ProjectId>, OrderError> {
    let in_batch: Vec<SeedProject> = projects
        .iter()
        .map(|(identifier, deps)| SeedProject {
            identifier: identifier.clone(),
            dependencies: deps
                .iter()
                .filter(|dep| projects.contains_key(*dep) && *dep != identifier)
                .cloned()
                .collect(),
        })
        .collect();

    let batches = install_order(in_batch, &BTreeSet::new())?;
    Ok(flatten_order(batches)
        .into_iter()
        .map(|p| p.identifier)
        .collect())
}

struct SeedProject {
    identifier: ProjectId,
    dependencies: Vec<ProjectId>,
}

impl Installable for SeedProject {
    fn identifier(&self) -> &ProjectId {
        &self.identifier
    }

    fn dependencies(&self) -> Vec<ProjectId> {
        self.dependencies.clone()
    }
}
