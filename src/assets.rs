//! Asset library: validated uploads and reference-safe deletion.
//!
//! Blob bytes live outside the store transaction. An upload writes the blob
//! first and the record second; a delete removes the record (nulling every
//! reference) and then the blob. Blob cleanup failures are logged and never
//! returned to the caller.

use std::sync::Arc;

use chrono::Utc;

use crate::blob::BlobStore;
use crate::config::{allowed_extensions, AuthoringConfig};
use crate::error::{AuthoringError, AuthoringResult};
use crate::store::{AuthoringStore, StoreTx};
use crate::types::{file_extension, Asset, AssetId, AssetType};

/// An asset upload request.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    /// Client-side filename.
    pub filename: String,
    /// Declared type.
    pub asset_type: AssetType,
    /// File contents.
    pub bytes: Vec<u8>,
    /// Declared MIME type; guessed from the extension when absent.
    pub mime_type: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Asset upload, listing and deletion.
pub struct AssetLibrary<S: AuthoringStore, B: BlobStore + ?Sized> {
    store: Arc<S>,
    blobs: Arc<B>,
    config: AuthoringConfig,
}

impl<S: AuthoringStore + 'static, B: BlobStore + ?Sized + 'static> AssetLibrary<S, B> {
    /// Create an asset library.
    pub fn new(store: Arc<S>, blobs: Arc<B>, config: AuthoringConfig) -> Self {
        Self { store, blobs, config }
    }

    /// Validate, store and record an upload.
    pub async fn upload(&self, upload: AssetUpload) -> AuthoringResult<Asset> {
        let ext = self.validate(&upload)?;

        let id = self
            .blobs
            .store(&upload.bytes, upload.asset_type, &upload.filename)
            .await
            .map_err(|e| AuthoringError::Storage(e.to_string()))?;

        let asset = Asset {
            id,
            original_filename: upload.filename,
            asset_type: upload.asset_type,
            mime_type: upload
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| guess_mime(ext.as_deref()).to_string()),
            size_bytes: upload.bytes.len() as u64,
            metadata: upload.metadata,
            created_at: Utc::now(),
        };

        if let Err(err) = self.record(&asset).await {
            self.discard_blob(&asset.id).await;
            return Err(err);
        }

        tracing::info!(
            asset_id = %asset.id,
            asset_type = %asset.asset_type,
            size_bytes = asset.size_bytes,
            "Asset uploaded"
        );
        Ok(asset)
    }

    /// Delete an asset, nulling every reference to it.
    pub async fn delete(&self, asset_id: &AssetId) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_asset(asset_id).await? {
            return Err(AuthoringError::not_found("asset", asset_id));
        }
        tx.commit().await?;

        self.discard_blob(asset_id).await;
        tracing::info!(asset_id = %asset_id, "Asset deleted");
        Ok(())
    }

    /// Fetch an asset record.
    pub async fn get(&self, asset_id: &AssetId) -> AuthoringResult<Asset> {
        let mut tx = self.store.begin().await?;
        tx.get_asset(asset_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("asset", asset_id))
    }

    /// Every asset record, newest first.
    pub async fn list(&self) -> AuthoringResult<Vec<Asset>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_assets().await?)
    }

    /// Public URL of an asset.
    pub fn url_of(&self, asset_id: &AssetId) -> String {
        self.blobs.url_of(asset_id)
    }

    fn validate(&self, upload: &AssetUpload) -> AuthoringResult<Option<String>> {
        if upload.filename.trim().is_empty() {
            return Err(AuthoringError::validation("filename is required"));
        }

        let size = upload.bytes.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(AuthoringError::validation(format!(
                "file is {} bytes; the limit is {} bytes",
                size, self.config.max_upload_bytes
            )));
        }

        let ext = file_extension(&upload.filename);
        if let Some(allowed) = allowed_extensions(upload.asset_type) {
            let ok = ext.as_deref().is_some_and(|e| allowed.contains(&e));
            if !ok {
                return Err(AuthoringError::validation(format!(
                    "extension {} is not allowed for {} assets (allowed: {})",
                    ext.as_deref().unwrap_or("(none)"),
                    upload.asset_type,
                    allowed.join(", ")
                )));
            }
        }
        Ok(ext)
    }

    async fn record(&self, asset: &Asset) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        tx.insert_asset(asset).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn discard_blob(&self, asset_id: &AssetId) {
        if let Err(err) = self.blobs.delete(asset_id).await {
            tracing::warn!(asset_id = %asset_id, error = %err, "Blob cleanup failed");
        }
    }
}

/// MIME type for a lower-cased extension (with dot).
fn guess_mime(ext: Option<&str>) -> &'static str {
    match ext {
        Some(".png") => "image/png",
        Some(".jpg") | Some(".jpeg") => "image/jpeg",
        Some(".gif") => "image/gif",
        Some(".webp") => "image/webp",
        Some(".mp3") => "audio/mpeg",
        Some(".wav") => "audio/wav",
        Some(".ogg") => "audio/ogg",
        Some(".mp4") => "video/mp4",
        Some(".webm") => "video/webm",
        Some(".gltf") => "model/gltf+json",
        Some(".glb") => "model/gltf-binary",
        Some(".obj") => "model/obj",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::store::InMemoryStore;

    fn library(limit: u64) -> (AssetLibrary<InMemoryStore, InMemoryBlobStore>, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::default());
        let config = AuthoringConfig::default().with_max_upload_bytes(limit);
        let lib = AssetLibrary::new(Arc::new(InMemoryStore::new()), Arc::clone(&blobs), config);
        (lib, blobs)
    }

    fn upload(filename: &str, asset_type: AssetType, size: usize) -> AssetUpload {
        AssetUpload {
            filename: filename.to_string(),
            asset_type,
            bytes: vec![0u8; size],
            mime_type: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_upload_records_asset() {
        let (lib, blobs) = library(1024);
        let asset = lib.upload(upload("Pump.GLB", AssetType::Model, 10)).await.unwrap();

        assert_eq!(asset.mime_type, "model/gltf-binary");
        assert_eq!(asset.size_bytes, 10);
        assert!(blobs.contains(&asset.id));
        assert_eq!(lib.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_size_and_extension() {
        let (lib, blobs) = library(8);

        let err = lib.upload(upload("big.png", AssetType::Image, 9)).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));

        let err = lib.upload(upload("scene.fbx", AssetType::Gltf, 1)).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));

        let err = lib.upload(upload("noext", AssetType::Audio, 1)).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));

        // Anything goes for "other".
        lib.upload(upload("notes.txt", AssetType::Other, 1)).await.unwrap();
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_swallows_blob_failure() {
        let (lib, blobs) = library(1024);
        let asset = lib.upload(upload("a.png", AssetType::Image, 1)).await.unwrap();

        blobs.fail_deletes(true);
        lib.delete(&asset.id).await.unwrap();

        assert!(lib.list().await.unwrap().is_empty());
        assert!(blobs.contains(&asset.id));
        assert!(matches!(
            lib.delete(&asset.id).await,
            Err(AuthoringError::NotFound { entity: "asset", .. })
        ));
    }
}
