//! Transitive dependency expansion with branch conflict resolution.
//!
//! [`Expansion`] holds no I/O: the caller pops the next `(identifier, branch)`
//! to fetch, fetches its metadata however it likes, and reports back with
//! [`Expansion::record`]. When two paths ask for different branches of the
//! same project, the newer branch is enqueued.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use cibuild_schema::types::compare_release_numbers;
use cibuild_schema::{Branch, PackageMetadata, ProjectId};

/// Errors raised during expansion.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExpandError {
    /// Two branches of a project were requested and neither is `master`
    /// nor a release number, so there is no way to tell which is newer.
    #[error("Cannot decide between branches '{existing}' and '{requested}' of {identifier}")]
    UnorderableBranches {
        /// Project with the conflict.
        identifier: ProjectId,
        /// Branch seen first.
        existing: Branch,
        /// Branch requested later.
        requested: Branch,
    },
}

/// A branch conflict and how it was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchConflict {
    /// Project with the conflict.
    pub identifier: ProjectId,
    /// Branch seen first.
    pub existing: Branch,
    /// Branch requested later.
    pub requested: Branch,
    /// Branch that was enqueued.
    pub winner: Branch,
}

/// Pick the newer of two branches.
///
/// `master` always wins. Otherwise both are compared as dotted release
/// numbers (`5.12` is newer than `5.3`); on a tie `b` is returned.
///
/// # Errors
///
/// Returns [`ExpandError::UnorderableBranches`] if a branch is neither
/// `master` nor a release number.
pub fn select_newer_branch(
    identifier: &ProjectId,
    a: &Branch,
    b: &Branch,
) -> Result<Branch, ExpandError> {
    if a.is_mainline() {
        return Ok(a.clone());
    }
    if b.is_mainline() {
        return Ok(b.clone());
    }

    match (a.release_number(), b.release_number()) {
        (Some(x), Some(y)) => Ok(match compare_release_numbers(&x, &y) {
            Ordering::Greater => a.clone(),
            _ => b.clone(),
        }),
        _ => Err(ExpandError::UnorderableBranches {
            identifier: identifier.clone(),
            existing: a.clone(),
            requested: b.clone(),
        }),
    }
}

/// Explicit worklist of packages still to fetch.
#[derive(Debug, Default)]
pub struct Expansion {
    frontier: BTreeMap<ProjectId, Branch>,
    fetched: BTreeSet<ProjectId>,
    branches: BTreeMap<ProjectId, Branch>,
    conflicts: Vec<BranchConflict>,
}

impl Expansion {
    /// Start from the direct dependencies of a build.
    pub fn new(initial: impl IntoIterator<Item = (ProjectId, Branch)>) -> Self {
        let frontier: BTreeMap<ProjectId, Branch> = initial.into_iter().collect();
        Self {
            branches: frontier.clone(),
            frontier,
            ..Self::default()
        }
    }

    /// Next package to fetch; identifiers already fetched are dropped.
    ///
    /// An identifier can come back after it was fetched when a newer branch
    /// wins a later conflict. The caller should then replace what it fetched
    /// before.
    pub fn next(&mut self) -> Option<(ProjectId, Branch)> {
        while let Some((identifier, branch)) = self.frontier.pop_last() {
            if !self.fetched.contains(&identifier) {
                return Some((identifier, branch));
            }
        }
        None
    }

    /// Report the metadata fetched for `identifier` at `branch`.
    ///
    /// Runtime dependencies are followed too when `runtime` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if a branch conflict cannot be settled.
    pub fn record(
        &mut self,
        identifier: &ProjectId,
        branch: &Branch,
        metadata: &PackageMetadata,
        runtime: bool,
    ) -> Result<(), ExpandError> {
        self.fetched.insert(identifier.clone());
        self.branches.insert(identifier.clone(), branch.clone());

        let mut children = metadata.dependencies.clone();
        if runtime {
            children.extend(
                metadata
                    .runtime_dependencies
                    .iter()
                    .map(|(id, b)| (id.clone(), b.clone())),
            );
        }

        for (child, requested) in children {
            let Some(existing) = self.branches.get(&child).cloned() else {
                self.branches.insert(child.clone(), requested.clone());
                self.frontier.insert(child, requested);
                continue;
            };
            if existing == requested {
                continue;
            }

            let winner = select_newer_branch(&child, &existing, &requested)?;
            tracing::info!(
                "Branch conflict for {child}: {existing} vs {requested}, using {winner}"
            );
            self.conflicts.push(BranchConflict {
                identifier: child.clone(),
                existing: existing.clone(),
                requested,
                winner: winner.clone(),
            });
            if winner == existing {
                continue;
            }

            // The loser may already be fetched; the winner replaces it
            self.fetched.remove(&child);
            self.branches.insert(child.clone(), winner.clone());
            self.frontier.insert(child, winner);
        }
        Ok(())
    }

    /// Whether `identifier` has been fetched.
    pub fn is_fetched(&self, identifier: &ProjectId) -> bool {
        self.fetched.contains(identifier)
    }

    /// Branch used (or to be used) for each identifier seen so far.
    pub fn branches(&self) -> &BTreeMap<ProjectId, Branch> {
        &self.branches
    }

    /// Every conflict settled so far, in order of discovery.
    pub fn conflicts(&self) -> &[BranchConflict] {
        &self.conflicts
    }
}
