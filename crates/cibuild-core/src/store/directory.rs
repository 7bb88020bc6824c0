//! A store backed by a local (or network mounted) directory.
//!
//! Layout: `<root>/<name>/<version>/<file>`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{RemoteStore, StoreEntry, StoreError};

/// Packages kept in a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Use `root` as the store; it is created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn subdirectories(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn list(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let mut listing = Vec::new();
        for name in subdirectories(&self.root).await? {
            for version in subdirectories(&self.root.join(&name)).await? {
                let handle = self.root.join(&name).join(&version).display().to_string();
                listing.push(StoreEntry {
                    name: name.clone(),
                    version,
                    handle,
                });
            }
        }
        Ok(listing)
    }

    async fn download(&self, name: &str, version: &str, file: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(name).join(version).join(file);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
                file: file.to_string(),
            },
            _ => e.into(),
        })
    }

    async fn upload(
        &self,
        name: &str,
        version: &str,
        file: &str,
        content: Vec<u8>,
    ) -> Result<(), StoreError> {
        let dir = self.root.join(name).join(version);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(file), content).await?;
        Ok(())
    }

    async fn delete(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        tokio::fs::remove_dir_all(self.root.join(&entry.name).join(&entry.version)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_list_download_delete() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path().join("store"));

        assert!(store.list().await.unwrap().is_empty());

        store
            .upload("kio", "master-10", "metadata.json", b"{}".to_vec())
            .await
            .unwrap();
        store
            .upload("kio", "master-20", "metadata.json", b"{}".to_vec())
            .await
            .unwrap();

        let listing = store.list().await.unwrap();
        let versions: Vec<&str> = listing.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, ["master-10", "master-20"]);

        assert_eq!(
            store.download("kio", "master-10", "metadata.json").await.unwrap(),
            b"{}"
        );
        assert!(matches!(
            store.download("kio", "master-10", "archive.tar").await,
            Err(StoreError::NotFound { .. })
        ));

        store.delete(&listing[0]).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
