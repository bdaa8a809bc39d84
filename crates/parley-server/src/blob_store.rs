use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parley_engine::{BlobStorage, StorageError};
use tokio::fs;
use tracing::{debug, info};

/// Resolve `relative` under `base`, refusing anything that would climb out
/// of it.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf, StorageError> {
    let mut resolved = base.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => {
                resolved.push(c);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(relative.to_string()));
            }
        }
    }
    if !pushed || !resolved.starts_with(base) {
        return Err(StorageError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Attachment blobs on the local filesystem, addressed by their path
/// relative to `base_path`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "Blob store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
        let full = ensure_within(&self.base_path, path)?;
        match fs::read(&full).await {
            Ok(data) => {
                debug!(path, size = data.len(), "Read blob");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStorage for BlobStore {
    async fn store(&self, bytes: Bytes, suggested_path: &str) -> Result<String, StorageError> {
        let full = ensure_within(&self.base_path, suggested_path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, &bytes).await?;

        debug!(path = suggested_path, size = bytes.len(), "Stored blob");
        Ok(suggested_path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = ensure_within(&self.base_path, path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = ensure_within(&self.base_path, path)?;
        Ok(fs::try_exists(&full).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_creates_nested_directories() {
        let (store, _dir) = test_store().await;
        let path = store
            .store(Bytes::from_static(b"jpeg"), "attachments/4/photo.jpg")
            .await
            .unwrap();

        assert_eq!(path, "attachments/4/photo.jpg");
        assert!(store.base_path().join("attachments/4/photo.jpg").exists());
        assert_eq!(store.read(&path).await.unwrap(), Bytes::from_static(b"jpeg"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;
        let path = store
            .store(Bytes::from_static(b"delete-me"), "attachments/1/a.bin")
            .await
            .unwrap();

        assert!(store.exists(&path).await.unwrap());
        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
        assert!(matches!(store.delete(&path).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.read("attachments/9/missing.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        for bad in ["../escape.txt", "attachments/../../etc/passwd", "/etc/passwd", ""] {
            assert!(
                matches!(
                    store.store(Bytes::from_static(b"x"), bad).await,
                    Err(StorageError::InvalidPath(_))
                ),
                "{bad} should be rejected"
            );
        }
        assert!(store.read("../secret").await.is_err());
    }
}
