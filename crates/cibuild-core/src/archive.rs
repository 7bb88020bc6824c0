//! Package payload archives.
//!
//! Payloads are plain `.tar` files holding an install tree with relative
//! names. Symlinks are stored as symlinks.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors raised while packing or unpacking payloads.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid path in archive: {0}")]
    UnsafePath(PathBuf),
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extract a tar archive into `dest_dir`, returning the number of entries.
///
/// # Errors
///
/// Returns [`ArchiveError::UnsafePath`] for entries that would land outside
/// `dest_dir`, or an I/O error.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    fs::create_dir_all(dest_dir).map_err(ArchiveError::io(dest_dir))?;
    let file = File::open(archive_path).map_err(ArchiveError::io(archive_path))?;

    let mut archive = tar::Archive::new(BufReader::new(file));
    archive.set_preserve_permissions(true);

    let mut count = 0;
    for entry in archive.entries().map_err(ArchiveError::io(archive_path))? {
        let mut entry = entry.map_err(ArchiveError::io(archive_path))?;
        let entry_path = entry
            .path()
            .map_err(ArchiveError::io(archive_path))?
            .into_owned();

        if !is_contained(&entry_path) {
            return Err(ArchiveError::UnsafePath(entry_path));
        }

        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(ArchiveError::io(&entry_path))?;
        if !unpacked {
            return Err(ArchiveError::UnsafePath(entry_path));
        }
        count += 1;
    }

    tracing::debug!(
        "Extracted {count} entries from {} into {}",
        archive_path.display(),
        dest_dir.display()
    );
    Ok(count)
}

/// Write the contents of `root` into a new tar archive at `archive_path`.
///
/// Entry names are relative to `root`.
///
/// # Errors
///
/// Returns an error if `root` cannot be read or the archive cannot be written.
pub fn capture(root: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent).map_err(ArchiveError::io(parent))?;
    }
    let file = File::create(archive_path).map_err(ArchiveError::io(archive_path))?;

    let mut builder = tar::Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    let mut entries: Vec<_> = fs::read_dir(root)
        .map_err(ArchiveError::io(root))?
        .collect::<Result<_, _>>()
        .map_err(ArchiveError::io(root))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let file_type = entry.file_type().map_err(ArchiveError::io(&path))?;
        if file_type.is_dir() {
            builder
                .append_dir_all(&name, &path)
                .map_err(ArchiveError::io(&path))?;
        } else {
            builder
                .append_path_with_name(&path, &name)
                .map_err(ArchiveError::io(&path))?;
        }
    }

    builder
        .into_inner()
        .and_then(|mut w| io::Write::flush(&mut w))
        .map_err(ArchiveError::io(archive_path))?;
    tracing::debug!("Captured {} into {}", root.display(), archive_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_capture_then_extract_keeps_links() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("install");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libfoo.so.5"), "lib").unwrap();
        symlink("libfoo.so.5", root.join("lib/libfoo.so")).unwrap();
        fs::write(root.join("README"), "hi").unwrap();

        let archive = dir.path().join("out/archive.tar");
        capture(&root, &archive).unwrap();

        let dest = dir.path().join("extracted");
        let count = extract(&archive, &dest).unwrap();
        assert!(count >= 3);
        assert_eq!(fs::read_to_string(dest.join("README")).unwrap(), "hi");
        assert_eq!(
            fs::read_link(dest.join("lib/libfoo.so")).unwrap(),
            Path::new("libfoo.so.5")
        );
    }

    #[test]
    fn test_entries_are_relative() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("install");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/tool"), "x").unwrap();

        let archive = dir.path().join("archive.tar");
        capture(&root, &archive).unwrap();

        let mut reader = tar::Archive::new(File::open(&archive).unwrap());
        let names: Vec<PathBuf> = reader
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect();
        assert!(names.contains(&PathBuf::from("bin/tool")));
        assert!(names.iter().all(|n| n.is_relative()));
    }

    #[test]
    fn test_rejects_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar");

        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        let mut header = tar::Header::new_gnu();
        let data = b"pwned";
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        // set_path refuses `..`, so write the name bytes directly
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        builder.finish().unwrap();
        drop(builder);

        let dest = dir.path().join("dest");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafePath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
