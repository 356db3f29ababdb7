//! services/api/src/adapters/blob_fs.rs
//!
//! `BlobStorage` on the local filesystem. Every blob is a single file directly
//! under the configured root, and the reference handed back to the core is
//! the bare file name.

use async_trait::async_trait;
use bytes::Bytes;
use pastebin_core::ports::{BlobStorage, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a reference to a path under the root.
    ///
    /// Only plain file names are accepted; anything that could escape the
    /// root yields `None`.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let plain = !reference.is_empty()
            && reference != "."
            && reference != ".."
            && !reference.contains(['/', '\\', '\0']);
        plain.then(|| self.root.join(reference))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn store(&self, name: &str, bytes: &[u8], extension: &str) -> PortResult<String> {
        let reference = format!("{name}{extension}");
        let path = self.resolve(&reference).ok_or_else(|| {
            PortError::InvalidArgument(format!("'{reference}' is not a valid file name"))
        })?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::io("creating the files directory", e))?;

        // Write to a sibling temp file and rename, so readers never see a partial blob.
        let tmp = self.root.join(format!(".{reference}.{}.part", Uuid::new_v4().simple()));
        if let Err(e) = write_file(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PortError::io(format!("writing {reference}"), e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PortError::io(format!("moving {reference} into place"), e));
        }

        debug!(reference = %reference, size = bytes.len(), "Stored blob");
        Ok(reference)
    }

    async fn exists(&self, reference: &str) -> PortResult<bool> {
        let Some(path) = self.resolve(reference) else {
            return Ok(false);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PortError::io(format!("checking {reference}"), e)),
        }
    }

    async fn read(&self, reference: &str) -> PortResult<Bytes> {
        let path = self
            .resolve(reference)
            .ok_or_else(|| PortError::NotFound("file not found".to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PortError::NotFound("file not found".to_string()))
            }
            Err(e) => Err(PortError::io(format!("reading {reference}"), e)),
        }
    }

    async fn remove(&self, reference: &str) -> PortResult<()> {
        let Some(path) = self.resolve(reference) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::io(format!("removing {reference}"), e)),
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_read_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(dir.path().join("files"));

        let reference = blobs.store("doc", b"hello", ".txt").await.unwrap();
        assert_eq!(reference, "doc.txt");
        assert!(blobs.exists(&reference).await.unwrap());
        assert_eq!(blobs.read(&reference).await.unwrap(), Bytes::from_static(b"hello"));

        blobs.remove(&reference).await.unwrap();
        assert!(!blobs.exists(&reference).await.unwrap());
        // Removing twice is fine.
        blobs.remove(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn store_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(dir.path());

        blobs.store("doc", b"first", "").await.unwrap();
        blobs.store("doc", b"second", "").await.unwrap();
        assert_eq!(blobs.read("doc").await.unwrap(), Bytes::from_static(b"second"));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStorage::new(dir.path());
        assert!(!blobs.exists("ghost.png").await.unwrap());
        assert!(matches!(
            blobs.read("ghost.png").await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn references_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("files");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret"), b"x").unwrap();
        let blobs = FsBlobStorage::new(&root);

        assert!(!blobs.exists("../secret").await.unwrap());
        assert!(matches!(
            blobs.read("../secret").await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            blobs.store("../evil", b"x", "").await,
            Err(PortError::InvalidArgument(_))
        ));
        blobs.remove("../secret").await.unwrap();
        assert!(dir.path().join("secret").exists());
    }
}
