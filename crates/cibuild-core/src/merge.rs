//! Conflict-aware recursive directory merge.
//!
//! Folds a source tree (an extracted package, or a staged installation)
//! into a destination prefix. Symlinks are never followed on the source
//! side and never replaced on the destination side: a symlink farm such as
//! `libfoo.so -> libfoo.so.5 -> libfoo.so.5.2.0` either agrees with what is
//! being merged or the merge fails.
//!
//! The decision for every entry is made by [`plan_directory`] and
//! [`plan_file`], which only look at the kinds of the two paths.

use glob::Pattern;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use walkdir::WalkDir;

/// Destination paths that are routinely overwritten by Python packaging.
const EXPECTED_OVERWRITES: [&str; 5] = [
    r".*/_vendor/.*\.py",
    r".*/site-packages/setuptools/.*",
    r"/__pycache__/",
    r".*site-packages/.*distutils.*",
    r".*site-packages/pkg_resources.*",
];

static EXPECTED_OVERWRITE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let alternatives: Vec<String> = EXPECTED_OVERWRITES.iter().map(|p| format!("({p})")).collect();
    Regex::new(&format!("^(?:{})", alternatives.join("|"))).ok()
});

static BYTECODE: LazyLock<Option<Pattern>> = LazyLock::new(|| Pattern::new("*.pyc").ok());

/// What a symlink points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Dangling link.
    Missing,
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Anything else (socket, fifo, device).
    Other,
}

/// Kind of a path, determined without following a final symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Nothing at the path.
    Missing,
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// A symlink.
    Symlink {
        /// Link contents as stored.
        target: PathBuf,
        /// What the link resolves to.
        resolves_to: LinkTarget,
    },
    /// Anything else.
    Other,
}

impl NodeKind {
    /// Inspect `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be inspected for a reason other
    /// than not existing.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::Missing),
            Err(e) => return Err(e),
        };

        let file_type = meta.file_type();
        Ok(if file_type.is_symlink() {
            let resolves_to = match fs::metadata(path) {
                Ok(m) if m.is_dir() => LinkTarget::Dir,
                Ok(m) if m.is_file() => LinkTarget::File,
                Ok(_) => LinkTarget::Other,
                Err(_) => LinkTarget::Missing,
            };
            Self::Symlink {
                target: fs::read_link(path)?,
                resolves_to,
            }
        } else if file_type.is_dir() {
            Self::Dir
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        })
    }

    fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink { .. })
    }

    /// Whether the path exists once symlinks are followed.
    pub fn exists(&self) -> bool {
        !matches!(
            self,
            Self::Missing
                | Self::Symlink {
                    resolves_to: LinkTarget::Missing,
                    ..
                }
        )
    }

    /// Whether the path is a directory once symlinks are followed.
    pub fn is_dir(&self) -> bool {
        matches!(
            self,
            Self::Dir
                | Self::Symlink {
                    resolves_to: LinkTarget::Dir,
                    ..
                }
        )
    }

    /// Whether the path is a regular file once symlinks are followed.
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            Self::File
                | Self::Symlink {
                    resolves_to: LinkTarget::File,
                    ..
                }
        )
    }

    fn link_target(&self) -> Option<&Path> {
        match self {
            Self::Symlink { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// Why two paths cannot be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A directory would replace something that is not a directory.
    NotADirectory,
    /// A file would replace something that is not a regular file.
    NotAFile,
    /// Both sides are symlinks with different targets.
    SymlinkMismatch,
    /// A symlink would replace a real directory.
    SymlinkOverDirectory,
    /// A symlink would replace a regular file.
    SymlinkOverFile,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotADirectory => "couldn't override a file with a folder",
            Self::NotAFile => "couldn't override not-a-file with a file",
            Self::SymlinkMismatch => "couldn't override a symlink with a different path",
            Self::SymlinkOverDirectory => "couldn't override a physical folder with a symlink",
            Self::SymlinkOverFile => "couldn't override a file with a symlink",
        })
    }
}

/// Action for a directory (or a symlink to one) found in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirAction {
    /// Recreate the source symlink at the destination.
    CopyLink,
    /// Create the destination directory and descend.
    Create,
    /// Descend; the destination already accepts the contents.
    Descend,
    /// Nothing to do below this point.
    SkipSubtree,
    /// Fail.
    Conflict(ConflictKind),
}

/// Action for a file (or a symlink to one) found in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Copy (or move) into place.
    Copy,
    /// Destination already identical.
    Keep,
    /// Replace the destination contents.
    Overwrite {
        /// The path is on the list of routinely overwritten files.
        expected: bool,
    },
    /// Fail.
    Conflict(ConflictKind),
}

/// Decide what to do with a source directory.
pub fn plan_directory(source: &NodeKind, destination: &NodeKind) -> DirAction {
    if !destination.exists() {
        return if source.is_symlink() {
            DirAction::CopyLink
        } else {
            DirAction::Create
        };
    }
    if !destination.is_dir() {
        return DirAction::Conflict(ConflictKind::NotADirectory);
    }

    match (source.link_target(), destination.link_target()) {
        (Some(a), Some(b)) if a == b => DirAction::SkipSubtree,
        (Some(_), Some(_)) => DirAction::Conflict(ConflictKind::SymlinkMismatch),
        (Some(_), None) => DirAction::Conflict(ConflictKind::SymlinkOverDirectory),
        // Writes into a destination symlink land in its target
        (None, _) => DirAction::Descend,
    }
}

/// Decide what to do with a source file installed at `destination_path`.
pub fn plan_file(source: &NodeKind, destination: &NodeKind, destination_path: &Path) -> FileAction {
    if !destination.exists() {
        return FileAction::Copy;
    }
    if !destination.is_file() {
        return FileAction::Conflict(ConflictKind::NotAFile);
    }

    match (source.link_target(), destination.link_target()) {
        (Some(a), Some(b)) if a == b => FileAction::Keep,
        (Some(_), Some(_)) => FileAction::Conflict(ConflictKind::SymlinkMismatch),
        (Some(_), None) => FileAction::Conflict(ConflictKind::SymlinkOverFile),
        (None, _) => FileAction::Overwrite {
            expected: is_expected_overwrite(destination_path),
        },
    }
}

/// Whether overwriting `path` is routine and not worth a warning.
pub fn is_expected_overwrite(path: &Path) -> bool {
    let as_str = path.to_string_lossy();
    let by_path = EXPECTED_OVERWRITE
        .as_ref()
        .is_some_and(|re| re.is_match(&as_str));
    let by_name = path
        .file_name()
        .zip(BYTECODE.as_ref())
        .is_some_and(|(name, pattern)| pattern.matches(&name.to_string_lossy()));
    by_path || by_name
}

/// Merge options.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Move files out of the source instead of copying them.
    pub moving_files: bool,
    /// Paths relative to the source that are left out with everything below them.
    pub skip_paths: Vec<PathBuf>,
    /// Warn about overwrites that are not on the expected list.
    pub warn_on_overwrite: bool,
}

/// Counters describing a finished merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Files and links newly placed.
    pub copied: usize,
    /// Files replaced.
    pub overwritten: usize,
    /// Replaced files not on the expected list.
    pub unexpected_overwrites: Vec<PathBuf>,
}

/// Errors raised while merging.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Source and destination cannot be reconciled.
    #[error("{kind}: {} -> {}", source_path.display(), destination.display())]
    Conflict {
        /// Kind of conflict.
        kind: ConflictKind,
        /// Entry in the source tree.
        source_path: PathBuf,
        /// Entry in the destination tree.
        destination: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("Failed to merge {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The source tree could not be walked.
    #[error("Failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> MergeError + '_ {
    move |source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Merge the tree at `source` into `destination`.
///
/// # Errors
///
/// Returns [`MergeError::Conflict`] on the first entry that cannot be
/// merged, or an I/O error. Entries handled before the failure stay merged.
pub fn merge_trees(
    source: &Path,
    destination: &Path,
    options: &MergeOptions,
) -> Result<MergeStats, MergeError> {
    fs::create_dir_all(destination).map_err(io_err(destination))?;
    let mut stats = MergeStats::default();

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(source)
                .map_or(true, |rel| !options.skip_paths.iter().any(|skip| skip == rel))
        });

    for entry in walker {
        let entry = entry?;
        let src_path = entry.path();
        let Ok(relative) = src_path.strip_prefix(source) else {
            continue;
        };
        let dst_path = destination.join(relative);

        let src_kind = NodeKind::of(src_path).map_err(io_err(src_path))?;
        let dst_kind = NodeKind::of(&dst_path).map_err(io_err(&dst_path))?;
        let conflict = |kind| MergeError::Conflict {
            kind,
            source_path: src_path.to_path_buf(),
            destination: dst_path.clone(),
        };

        if src_kind.is_dir() {
            match plan_directory(&src_kind, &dst_kind) {
                DirAction::CopyLink => {
                    place(src_path, &dst_path, &src_kind, options.moving_files)?;
                    stats.copied += 1;
                }
                DirAction::Create => fs::create_dir(&dst_path).map_err(io_err(&dst_path))?,
                DirAction::Descend => {}
                // Source symlinks are never descended into
                DirAction::SkipSubtree => {}
                DirAction::Conflict(kind) => return Err(conflict(kind)),
            }
            continue;
        }

        match plan_file(&src_kind, &dst_kind, &dst_path) {
            FileAction::Copy => {
                place(src_path, &dst_path, &src_kind, options.moving_files)?;
                stats.copied += 1;
            }
            FileAction::Keep => {}
            FileAction::Overwrite { expected } => {
                if !expected {
                    if options.warn_on_overwrite {
                        tracing::warn!(
                            "Overwriting a file: {} -> {}",
                            src_path.display(),
                            dst_path.display()
                        );
                    }
                    stats.unexpected_overwrites.push(dst_path.clone());
                }
                place(src_path, &dst_path, &src_kind, options.moving_files)?;
                stats.overwritten += 1;
            }
            FileAction::Conflict(kind) => return Err(conflict(kind)),
        }
    }

    Ok(stats)
}

/// Put `src` at `dst`, keeping symlinks as symlinks.
///
/// A destination symlink is written through, never replaced.
fn place(src: &Path, dst: &Path, kind: &NodeKind, moving: bool) -> Result<(), MergeError> {
    let dst_is_link = fs::symlink_metadata(dst).is_ok_and(|m| m.file_type().is_symlink());
    if moving && !dst_is_link && fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    match kind {
        NodeKind::Symlink { target, .. } => {
            std::os::unix::fs::symlink(target, dst).map_err(io_err(dst))?;
        }
        _ => {
            fs::copy(src, dst).map_err(io_err(dst))?;
        }
    }

    if moving {
        fs::remove_file(src).map_err(io_err(src))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn link() -> NodeKind {
        NodeKind::Symlink {
            target: "a".into(),
            resolves_to: LinkTarget::Dir,
        }
    }

    fn link_to(target: &str, resolves_to: LinkTarget) -> NodeKind {
        NodeKind::Symlink {
            target: target.into(),
            resolves_to,
        }
    }

    #[test]
    fn test_directory_table() {
        use DirAction::*;
        use NodeKind::{Dir, File, Missing};

        assert_eq!(plan_directory(&Dir, &Missing), Create);
        assert_eq!(plan_directory(&link(), &Missing), CopyLink);
        assert_eq!(
            plan_directory(&Dir, &File),
            Conflict(ConflictKind::NotADirectory)
        );
        assert_eq!(
            plan_directory(&Dir, &link_to("f", LinkTarget::File)),
            Conflict(ConflictKind::NotADirectory)
        );
        assert_eq!(plan_directory(&link(), &link()), SkipSubtree);
        assert_eq!(
            plan_directory(&link(), &link_to("b", LinkTarget::Dir)),
            Conflict(ConflictKind::SymlinkMismatch)
        );
        assert_eq!(plan_directory(&Dir, &link()), Descend);
        assert_eq!(
            plan_directory(&link(), &Dir),
            Conflict(ConflictKind::SymlinkOverDirectory)
        );
        assert_eq!(plan_directory(&Dir, &Dir), Descend);
    }

    #[test]
    fn test_file_table() {
        use FileAction::*;
        use NodeKind::{Dir, File, Missing};
        let path = Path::new("/prefix/bin/tool");

        assert_eq!(plan_file(&File, &Missing, path), Copy);
        assert_eq!(
            plan_file(&File, &link_to("gone", LinkTarget::Missing), path),
            Copy
        );
        assert_eq!(
            plan_file(&File, &Dir, path),
            Conflict(ConflictKind::NotAFile)
        );
        let so = link_to("libfoo.so.5", LinkTarget::File);
        assert_eq!(plan_file(&so, &so, path), Keep);
        assert_eq!(
            plan_file(&so, &link_to("libfoo.so.6", LinkTarget::File), path),
            Conflict(ConflictKind::SymlinkMismatch)
        );
        assert_eq!(
            plan_file(&so, &File, path),
            Conflict(ConflictKind::SymlinkOverFile)
        );
        assert_eq!(plan_file(&File, &so, path), Overwrite { expected: false });
        assert_eq!(plan_file(&File, &File, path), Overwrite { expected: false });
    }

    #[test]
    fn test_expected_overwrites() {
        assert!(is_expected_overwrite(Path::new("/p/lib/pkg/_vendor/mylib.py")));
        assert!(is_expected_overwrite(Path::new(
            "/p/lib/site-packages/setuptools/dist.py"
        )));
        assert!(is_expected_overwrite(Path::new("/p/lib/mod.cpython-311.pyc")));
        assert!(is_expected_overwrite(Path::new(
            "/p/lib/site-packages/pkg_resources/__init__.py"
        )));
        assert!(!is_expected_overwrite(Path::new("/p/lib/pkg/_vendor/mylib.cpy")));
        assert!(!is_expected_overwrite(Path::new("/p/bin/krita")));
    }

    #[test]
    fn test_merge_into_symlinked_directories() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        fs::create_dir_all(dst.join("usr/lib/site-packages")).unwrap();
        fs::create_dir_all(dst.join("bin")).unwrap();
        symlink(dst.join("usr/lib"), dst.join("lib")).unwrap();
        write(&dst.join("bin/krita"), "krita executable");
        write(&dst.join("usr/lib/version_info"), "version 1");
        symlink(dst.join("usr/lib/version_info"), dst.join("version_info")).unwrap();

        write(&src.join("bin/python"), "python executable");
        write(&src.join("lib/python.so.3.8"), "python lib");
        symlink(src.join("lib/python.so.3.8"), src.join("lib/python.so")).unwrap();
        write(&src.join("share/translation.en"), "some translation");

        merge_trees(&src, &dst, &MergeOptions::default()).unwrap();

        assert!(dst.join("lib").is_symlink());
        assert!(dst.join("lib/python.so.3.8").exists());
        assert!(dst.join("lib/python.so").is_symlink());
        assert!(dst.join("usr/lib/python.so.3.8").exists());
        assert!(dst.join("usr/lib/python.so").is_symlink());
        assert!(dst.join("usr/lib/version_info").exists());
        assert!(dst.join("share/translation.en").exists());
        assert!(dst.join("bin/python").exists());
    }

    #[test]
    fn test_skip_paths_are_exact_relative_paths() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&dst.join("CMakeLists.txt"), "build instruction");
        write(&dst.join("patches/patch1"), "patch1");
        write(&src.join(".ci-override.yml"), "CI config");
        write(&src.join("patches/patch2"), "patch2");
        fs::create_dir_all(src.join("_build/ext_foobar")).unwrap();
        fs::create_dir_all(src.join("_staging")).unwrap();
        fs::create_dir_all(src.join("patches/non-needed-dir")).unwrap();
        fs::create_dir_all(src.join("patches/needed-dir")).unwrap();

        let options = MergeOptions {
            skip_paths: ["_build", "_staging", "needed-dir", "patches/non-needed-dir"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            ..MergeOptions::default()
        };
        merge_trees(&src, &dst, &options).unwrap();

        assert!(dst.join("CMakeLists.txt").exists());
        assert!(dst.join("patches/patch1").exists());
        assert!(dst.join(".ci-override.yml").exists());
        assert!(dst.join("patches/patch2").exists());
        assert!(!dst.join("_build").exists());
        assert!(!dst.join("_staging").exists());
        assert!(!dst.join("patches/non-needed-dir").exists());
        assert!(dst.join("patches/needed-dir").exists());
    }

    #[test]
    fn test_overwrite_keeps_destination_symlinks() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&dst.join("python-3.8.0.so"), "python lib");
        symlink(dst.join("python-3.8.0.so"), dst.join("python.so")).unwrap();
        write(&src.join("python-3.8.0.so"), "a different python lib");

        let stats = merge_trees(&src, &dst, &MergeOptions::default()).unwrap();

        assert!(dst.join("python.so").is_symlink());
        assert_eq!(
            fs::read_to_string(dst.join("python-3.8.0.so")).unwrap(),
            "a different python lib"
        );
        assert_eq!(stats.overwritten, 1);
        assert_eq!(stats.unexpected_overwrites, [dst.join("python-3.8.0.so")]);
    }

    #[test]
    fn test_expected_overwrites_are_not_reported() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        for (tree, text) in [(&dst, "python lib 1"), (&src, "python lib 2")] {
            write(&tree.join("pkg/_vendor/mylib.py"), text);
            write(&tree.join("pkg/_vendor/mylib.cpy"), text);
        }

        let options = MergeOptions {
            warn_on_overwrite: true,
            ..MergeOptions::default()
        };
        let stats = merge_trees(&src, &dst, &options).unwrap();

        assert_eq!(stats.overwritten, 2);
        assert_eq!(
            stats.unexpected_overwrites,
            [dst.join("pkg/_vendor/mylib.cpy")]
        );
        assert_eq!(
            fs::read_to_string(dst.join("pkg/_vendor/mylib.py")).unwrap(),
            "python lib 2"
        );
    }

    #[test]
    fn test_symlink_over_file_conflicts() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&dst.join("python.so"), "a different python lib");
        write(&src.join("python-3.8.0.so"), "python lib");
        symlink(src.join("python-3.8.0.so"), src.join("python.so")).unwrap();

        let err = merge_trees(&src, &dst, &MergeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Conflict {
                kind: ConflictKind::SymlinkOverFile,
                ..
            }
        ));
    }

    #[test]
    fn test_different_symlinks_conflict() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&dst.join("python-3.9.0.so"), "python lib");
        symlink(dst.join("python-3.9.0.so"), dst.join("python.so")).unwrap();
        write(&src.join("python-3.8.0.so"), "python lib");
        symlink(src.join("python-3.8.0.so"), src.join("python.so")).unwrap();

        let err = merge_trees(&src, &dst, &MergeOptions::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&src.join("python.so").display().to_string()), "{message}");
        assert!(message.contains(&dst.join("python.so").display().to_string()), "{message}");
        assert!(std::error::Error::source(&err).is_none());
        match err {
            MergeError::Conflict {
                kind,
                source_path,
                destination,
            } => {
                assert_eq!(kind, ConflictKind::SymlinkMismatch);
                assert_eq!(source_path, src.join("python.so"));
                assert_eq!(destination, dst.join("python.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_symlink_over_real_directory_conflicts() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        fs::create_dir_all(dst.join("lib")).unwrap();
        fs::create_dir_all(src.join("usr/lib")).unwrap();
        symlink("usr/lib", src.join("lib")).unwrap();

        let err = merge_trees(&src, &dst, &MergeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Conflict {
                kind: ConflictKind::SymlinkOverDirectory,
                ..
            }
        ));
    }

    #[test]
    fn test_remerge_is_a_no_op() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&src.join("a/b.txt"), "content");
        write(&src.join("lib/libfoo.so.5"), "lib");
        symlink("libfoo.so.5", src.join("lib/libfoo.so")).unwrap();
        symlink("lib", src.join("lib64")).unwrap();

        merge_trees(&src, &dst, &MergeOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(dst.join("a/b.txt")).unwrap(), "content");
        assert_eq!(
            fs::read_link(dst.join("lib/libfoo.so")).unwrap(),
            Path::new("libfoo.so.5")
        );

        let stats = merge_trees(&src, &dst, &MergeOptions::default()).unwrap();
        assert_eq!(stats.copied, 0);
        assert_eq!(fs::read_to_string(dst.join("a/b.txt")).unwrap(), "content");
        assert!(dst.join("lib64").is_symlink());
    }

    #[test]
    fn test_moving_files_empties_source() {
        let wd = TempDir::new().unwrap();
        let dst = wd.path().join("dst");
        let src = wd.path().join("src");

        write(&src.join("a/b.txt"), "content");
        symlink("b.txt", src.join("a/c.txt")).unwrap();

        let options = MergeOptions {
            moving_files: true,
            ..MergeOptions::default()
        };
        merge_trees(&src, &dst, &options).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a/b.txt")).unwrap(), "content");
        assert!(dst.join("a/c.txt").is_symlink());
        assert!(!src.join("a/b.txt").exists());
    }
}
