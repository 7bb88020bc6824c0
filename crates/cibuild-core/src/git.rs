//! Mainline ancestry search in a Git working copy.
//!
//! Used by `@same` when neither the ref protection flag nor a merge request
//! target tells us which mainline branch a build descends from. The search
//! finds the oldest commit unique to `HEAD` and asks which mainline refs
//! contain its parent.

use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use thiserror::Error;

use cibuild_schema::types::compare_release_numbers;
use cibuild_schema::{Branch, MAINLINE_BRANCH};

/// `master` or any branch carrying a dotted release number.
static MAINLINE_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"refs/heads/master|refs/heads/.*[0-9]\.[0-9]+").ok());

const HEADS_PREFIX: &str = "refs/heads/";

/// Errors from running `git`.
#[derive(Error, Debug)]
pub enum GitError {
    /// No `git` executable on `PATH`.
    #[error("git executable not found: {0}")]
    NotFound(#[from] which::Error),

    /// The process could not be started.
    #[error("Failed to run git: {0}")]
    Io(#[from] std::io::Error),

    /// `git` exited with a failure status.
    #[error("git {args} failed: {stderr}")]
    Failed {
        /// Arguments of the failed invocation.
        args: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// A working copy that can be queried with `git`.
#[derive(Debug, Clone)]
pub struct GitRepository {
    git: PathBuf,
    workdir: PathBuf,
}

impl GitRepository {
    /// Locate `git` and bind it to `workdir`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] if `git` is not installed.
    pub fn open(workdir: &Path) -> Result<Self, GitError> {
        Ok(Self {
            git: which::which("git")?,
            workdir: workdir.to_path_buf(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(&self.workdir)
            .output()?;

        if !output.status.success() {
            return Err(GitError::Failed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Full names of all mainline refs (`refs/heads/master`, `refs/heads/5.3`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if `git for-each-ref` fails.
    pub fn mainline_refs(&self) -> Result<Vec<String>, GitError> {
        let out = self.run(&["for-each-ref", "--format=%(refname)", HEADS_PREFIX])?;
        Ok(filter_mainline(out.lines()))
    }

    /// Oldest commit reachable from `HEAD` but from none of `mainline`.
    ///
    /// Falls back to `HEAD` when every commit is already on a mainline.
    ///
    /// # Errors
    ///
    /// Returns an error if `git rev-list` fails.
    pub fn first_unique_commit(&self, mainline: &[String]) -> Result<String, GitError> {
        let excluded: Vec<String> = mainline.iter().map(|r| format!("^{r}")).collect();
        let mut args = vec!["rev-list", "--reverse", "HEAD"];
        args.extend(excluded.iter().map(String::as_str));

        let out = self.run(&args)?;
        Ok(out
            .lines()
            .next()
            .map_or_else(|| "HEAD".to_string(), str::to_string))
    }

    /// Short names of the mainline branches containing `commit`.
    ///
    /// # Errors
    ///
    /// Returns an error if `git for-each-ref` fails (for example when
    /// `commit` does not exist).
    pub fn mainline_branches_containing(&self, commit: &str) -> Result<Vec<String>, GitError> {
        let out = self.run(&[
            "for-each-ref",
            "--format=%(refname)",
            "--contains",
            commit,
            HEADS_PREFIX,
        ])?;
        Ok(filter_mainline(out.lines())
            .into_iter()
            .filter_map(|r| r.strip_prefix(HEADS_PREFIX).map(str::to_string))
            .collect())
    }

    /// The mainline branch `HEAD` most likely forked from.
    ///
    /// # Errors
    ///
    /// Returns an error if listing refs or commits fails. A failure to find
    /// containing refs is not an error: it yields `master`.
    pub fn mainline_ancestor(&self) -> Result<Branch, GitError> {
        let mainline = self.mainline_refs()?;
        let first = self.first_unique_commit(&mainline)?;
        tracing::debug!("First commit unique to HEAD: {first}");

        let candidates = self
            .mainline_branches_containing(&format!("{first}^"))
            .unwrap_or_else(|e| {
                tracing::debug!("No mainline contains the fork point: {e}");
                Vec::new()
            });
        Ok(pick_mainline(&candidates))
    }
}

fn filter_mainline<'a>(refs: impl Iterator<Item = &'a str>) -> Vec<String> {
    let Some(pattern) = MAINLINE_REF.as_ref() else {
        return Vec::new();
    };
    refs.map(str::trim)
        .filter(|r| pattern.is_match(r))
        .map(str::to_string)
        .collect()
}

/// Choose between mainline branches that contain a fork point.
///
/// `master` wins when present (or when there are no candidates at all);
/// otherwise the highest release number wins.
pub fn pick_mainline<S: AsRef<str>>(candidates: &[S]) -> Branch {
    if candidates.is_empty() || candidates.iter().any(|c| c.as_ref() == MAINLINE_BRANCH) {
        return Branch::new(MAINLINE_BRANCH);
    }

    candidates
        .iter()
        .map(|c| Branch::new(c.as_ref()))
        .max_by(natural_order)
        .unwrap_or_else(|| Branch::new(MAINLINE_BRANCH))
}

/// Numeric order for release branches, name order for everything else.
fn natural_order(a: &Branch, b: &Branch) -> Ordering {
    let digits = |branch: &Branch| -> Vec<u64> {
        branch
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    };
    compare_release_numbers(&digits(a), &digits(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_mainline() {
        let refs = [
            "refs/heads/master",
            "refs/heads/5.3",
            "refs/heads/release/24.08",
            "refs/heads/work/feature",
            "refs/heads/kf5",
            "refs/tags/v5.3",
        ];
        assert_eq!(
            filter_mainline(refs.into_iter()),
            ["refs/heads/master", "refs/heads/5.3", "refs/heads/release/24.08"]
        );
    }

    #[test]
    fn test_pick_mainline() {
        assert_eq!(pick_mainline::<&str>(&[]), "master");
        assert_eq!(pick_mainline(&["5.3", "master"]), "master");
        assert_eq!(pick_mainline(&["5.3", "5.12", "5.9"]), "5.12");
        assert_eq!(pick_mainline(&["release/23.08", "release/24.02"]), "release/24.02");
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=ci", "-c", "user.email=ci@example.org"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?}: {status:?}");
    }

    fn commit(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), name).unwrap();
        git(dir, &["add", name]);
        git(dir, &["commit", "-q", "-m", name]);
    }

    #[test]
    fn test_mainline_ancestor_in_real_repository() {
        if which::which("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        git(path, &["init", "-q"]);
        git(path, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        commit(path, "a");
        git(path, &["branch", "5.3"]);
        git(path, &["checkout", "-q", "5.3"]);
        commit(path, "b");

        // A feature branch forked from the release branch
        git(path, &["checkout", "-q", "-b", "work/fix"]);
        commit(path, "c");
        let repo = GitRepository::open(path).unwrap();
        assert_eq!(repo.mainline_ancestor().unwrap(), "5.3");

        // One forked from master, whose fork point both mainlines contain
        git(path, &["checkout", "-q", "master"]);
        git(path, &["checkout", "-q", "-b", "work/other"]);
        commit(path, "d");
        assert_eq!(repo.mainline_ancestor().unwrap(), "master");
    }
}
