//! Binary asset storage.
//!
//! The authoring core only needs three operations from a blob backend:
//! store bytes and get an id, resolve an id to a URL, and delete by id.
//! Deletion is best-effort; callers log failures and move on.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{file_extension, AssetId, AssetType};

/// Blob backend failure.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The backend rejected the write.
    #[error("Blob write failed: {0}")]
    Write(String),
    /// The backend could not delete the blob.
    #[error("Blob delete failed: {0}")]
    Delete(String),
}

/// Opaque binary store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist bytes and return the id they are stored under.
    async fn store(&self, bytes: &[u8], asset_type: AssetType, filename: &str) -> Result<AssetId, BlobError>;

    /// Public URL of a stored blob. Empty when the id is unknown.
    fn url_of(&self, id: &AssetId) -> String;

    /// Remove a blob.
    async fn delete(&self, id: &AssetId) -> Result<(), BlobError>;
}

struct StoredBlob {
    key: String,
    bytes: Vec<u8>,
}

/// In-process blob store for tests and local runs.
///
/// Keys follow `assets/{type}/{id}/original{ext}` under the media URL.
pub struct InMemoryBlobStore {
    media_url: String,
    blobs: RwLock<HashMap<AssetId, StoredBlob>>,
    fail_deletes: RwLock<bool>,
}

impl InMemoryBlobStore {
    /// Create an empty store serving URLs under `media_url`.
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            media_url: media_url.into(),
            blobs: RwLock::new(HashMap::new()),
            fail_deletes: RwLock::new(false),
        }
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write() = fail;
    }

    /// Whether a blob is held for the id.
    pub fn contains(&self, id: &AssetId) -> bool {
        self.blobs.read().contains_key(id)
    }

    /// Stored size of a blob.
    pub fn size_of(&self, id: &AssetId) -> Option<usize> {
        self.blobs.read().get(id).map(|b| b.bytes.len())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("/media/")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, bytes: &[u8], asset_type: AssetType, filename: &str) -> Result<AssetId, BlobError> {
        let id = AssetId::generate();
        let ext = file_extension(filename).unwrap_or_default();
        let key = format!("assets/{}/{}/original{}", asset_type.as_str(), id, ext);
        self.blobs.write().insert(
            id,
            StoredBlob {
                key,
                bytes: bytes.to_vec(),
            },
        );
        Ok(id)
    }

    fn url_of(&self, id: &AssetId) -> String {
        self.blobs
            .read()
            .get(id)
            .map(|b| format!("{}{}", self.media_url, b.key))
            .unwrap_or_default()
    }

    async fn delete(&self, id: &AssetId) -> Result<(), BlobError> {
        if *self.fail_deletes.read() {
            return Err(BlobError::Delete(format!("backend unavailable for {}", id)));
        }
        self.blobs.write().remove(id);
        Ok(())
    }
}
