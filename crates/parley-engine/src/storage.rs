//! Boundary with the blob storage collaborator.
//!
//! The engine never keeps attachment bytes; it hands them to a
//! [`BlobStorage`] and records the returned reference.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parley_shared::types::ConversationId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Blob not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Persist `bytes`, preferably under `suggested_path`. Returns the
    /// reference to record.
    async fn store(&self, bytes: Bytes, suggested_path: &str) -> Result<String, StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// An uploaded file travelling with `SendMessage`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

/// `attachments/{conversation}/{uuid}.{ext}`, with the extension taken from
/// the uploaded file name.
pub fn attachment_path(conversation: ConversationId, file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());

    format!("attachments/{conversation}/{}.{ext}", Uuid::new_v4())
}

/// Blob storage held in memory, for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn store(&self, bytes: Bytes, suggested_path: &str) -> Result<String, StorageError> {
        if suggested_path.is_empty() || suggested_path.contains("..") {
            return Err(StorageError::InvalidPath(suggested_path.to_string()));
        }
        self.blobs.insert(suggested_path.to_string(), bytes);
        Ok(suggested_path.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_path_keeps_sane_extension() {
        let path = attachment_path(ConversationId(7), "Holiday.JPG");
        assert!(path.starts_with("attachments/7/"));
        assert!(path.ends_with(".jpg"));

        assert!(attachment_path(ConversationId(7), "noext").ends_with(".bin"));
        assert!(attachment_path(ConversationId(7), "evil.p/hp").ends_with(".bin"));
    }

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        let path = storage
            .store(Bytes::from_static(b"png"), "attachments/1/a.png")
            .await
            .unwrap();

        assert!(storage.exists(&path).await.unwrap());
        storage.delete(&path).await.unwrap();
        assert!(!storage.exists(&path).await.unwrap());
        assert!(storage.delete(&path).await.is_err());
    }
}
