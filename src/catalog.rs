//! Catalog projection over published modules.
//!
//! Counts and metadata are computed from the current store state, not from
//! snapshots, so the catalog reflects edits made after the last publish.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::AuthoringConfig;
use crate::error::AuthoringResult;
use crate::store::{AuthoringStore, StoreTx};
use crate::types::{CatalogDocument, CatalogEntry, Module, ModuleStatus};

/// Builds the module catalog.
pub struct CatalogProjection<S: AuthoringStore, B: BlobStore + ?Sized> {
    store: Arc<S>,
    blobs: Arc<B>,
    config: AuthoringConfig,
}

impl<S: AuthoringStore + 'static, B: BlobStore + ?Sized + 'static> CatalogProjection<S, B> {
    /// Create a catalog projection.
    pub fn new(store: Arc<S>, blobs: Arc<B>, config: AuthoringConfig) -> Self {
        Self { store, blobs, config }
    }

    /// Catalog of every published module, newest first.
    pub async fn catalog(&self) -> AuthoringResult<CatalogDocument> {
        let mut tx = self.store.begin().await?;
        let modules = tx.list_modules_with_status(ModuleStatus::Published).await?;

        let mut entries = Vec::with_capacity(modules.len());
        for module in modules {
            let tasks = tx.list_tasks(&module.id).await?;
            let mut step_count = 0;
            for task in &tasks {
                step_count += tx.list_task_steps(&task.id).await?.len();
            }
            entries.push(self.entry(module, tasks.len(), step_count));
        }

        tracing::debug!(modules = entries.len(), "Catalog projected");
        Ok(CatalogDocument { modules: entries })
    }

    fn entry(&self, module: Module, task_count: usize, step_count: usize) -> CatalogEntry {
        let thumbnail = module
            .thumbnail
            .map(|asset| self.blobs.url_of(&asset))
            .unwrap_or_default();
        CatalogEntry {
            json_path: self.config.json_path(&module.code),
            module_id: module.code,
            title: module.title,
            description: module.description,
            version: module.version,
            mode: module.mode.as_str().to_string(),
            estimated_duration_min: module.estimated_duration_min,
            language: module.language,
            task_count,
            step_count,
            icon: module.icon,
            thumbnail,
            tags: module.tags,
        }
    }
}
