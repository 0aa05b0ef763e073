use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Backing store for document bytes, addressed by stored filename
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Move a finished upload from a local temp path into storage
    async fn put_file(&self, path: &str, local_path: &std::path::Path) -> Result<()>;

    /// Download data from storage
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Delete data from storage; deleting a missing object is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool>;
}
