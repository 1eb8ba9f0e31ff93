//! Publishing and detail serving.
//!
//! Publish projects a module and freezes the result as the next snapshot
//! version in the same transaction that flips the module to `published`.
//! Snapshots are never rewritten afterwards.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::{AuthoringConfig, DetailSource};
use crate::error::{AuthoringError, AuthoringResult};
use crate::projection::{project_module, ModuleGraph};
use crate::store::{AuthoringStore, StoreTx};
use crate::types::{Module, ModuleDocument, ModuleId, ModuleStatus, PublishedSnapshot};

/// Schema tag written into every snapshot.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Creates snapshots and serves module detail documents.
pub struct Publisher<S: AuthoringStore, B: BlobStore + ?Sized> {
    store: Arc<S>,
    blobs: Arc<B>,
    config: AuthoringConfig,
}

impl<S: AuthoringStore + 'static, B: BlobStore + ?Sized + 'static> Publisher<S, B> {
    /// Create a publisher.
    pub fn new(store: Arc<S>, blobs: Arc<B>, config: AuthoringConfig) -> Self {
        Self { store, blobs, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AuthoringConfig {
        &self.config
    }

    /// Publish the current state of a module as its next version.
    ///
    /// Fails with `PreconditionFailed` if the module has no tasks. Racing
    /// publishers of the same module surface as `ConstraintViolation`.
    pub async fn publish(&self, module_id: &ModuleId) -> AuthoringResult<PublishedSnapshot> {
        let mut tx = self.store.begin().await?;
        let module = tx
            .get_module(module_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("module", module_id))?;

        let graph = ModuleGraph::load(&mut tx, module).await?;
        if graph.tasks.is_empty() {
            return Err(AuthoringError::PreconditionFailed(format!(
                "module {} has no tasks",
                graph.module.code
            )));
        }

        let document = project_module(&graph, self.blobs.as_ref());
        let version = tx.latest_snapshot_version(module_id).await?.unwrap_or(0) + 1;
        let snapshot = PublishedSnapshot::freeze(*module_id, version, SNAPSHOT_SCHEMA_VERSION, &document)?;
        tx.insert_snapshot(&snapshot).await?;

        let mut module = graph.module;
        module.status = ModuleStatus::Published;
        module.updated_at = chrono::Utc::now();
        tx.update_module(&module).await?;
        tx.commit().await?;

        tracing::info!(
            module_id = %module.id,
            code = %module.code,
            version,
            tasks = document.task_count(),
            steps = document.step_count(),
            content_hash = %snapshot.content_hash,
            "Module published"
        );
        Ok(snapshot)
    }

    /// Return a module to draft. Existing snapshots are kept.
    pub async fn unpublish(&self, module_id: &ModuleId) -> AuthoringResult<Module> {
        let mut tx = self.store.begin().await?;
        let mut module = tx
            .get_module(module_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("module", module_id))?;

        if module.status != ModuleStatus::Draft {
            module.status = ModuleStatus::Draft;
            module.updated_at = chrono::Utc::now();
            tx.update_module(&module).await?;
            tx.commit().await?;
            tracing::info!(module_id = %module.id, code = %module.code, "Module unpublished");
        }
        Ok(module)
    }

    /// Detail document for a module code.
    ///
    /// In snapshot mode this is the latest snapshot payload; in live mode a
    /// projection of the current store state.
    pub async fn module_detail(&self, code: &str) -> AuthoringResult<ModuleDocument> {
        let mut tx = self.store.begin().await?;
        let module = tx
            .get_module_by_code(code)
            .await?
            .ok_or_else(|| AuthoringError::not_found("module", code))?;

        match self.config.detail_source {
            DetailSource::Snapshot => {
                let snapshot = tx
                    .latest_snapshot(&module.id)
                    .await?
                    .ok_or_else(|| AuthoringError::not_found("snapshot", code))?;
                if !snapshot.verify() {
                    tracing::warn!(
                        module_id = %module.id,
                        version = snapshot.version,
                        "Snapshot payload does not match its content hash"
                    );
                }
                Ok(snapshot.document()?)
            }
            DetailSource::Live => {
                let graph = ModuleGraph::load(&mut tx, module).await?;
                Ok(project_module(&graph, self.blobs.as_ref()))
            }
        }
    }

    /// Live projection of a module by id, without publishing.
    pub async fn preview(&self, module_id: &ModuleId) -> AuthoringResult<ModuleDocument> {
        let mut tx = self.store.begin().await?;
        let module = tx
            .get_module(module_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("module", module_id))?;
        let graph = ModuleGraph::load(&mut tx, module).await?;
        Ok(project_module(&graph, self.blobs.as_ref()))
    }

    /// Every snapshot of a module, newest version first.
    pub async fn list_snapshots(&self, module_id: &ModuleId) -> AuthoringResult<Vec<PublishedSnapshot>> {
        let mut tx = self.store.begin().await?;
        if tx.get_module(module_id).await?.is_none() {
            return Err(AuthoringError::not_found("module", module_id));
        }
        Ok(tx.list_snapshots(module_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::store::InMemoryStore;
    use crate::types::{Step, Task};

    async fn setup(detail_source: DetailSource) -> (Publisher<InMemoryStore, InMemoryBlobStore>, Arc<InMemoryStore>, Module) {
        let store = Arc::new(InMemoryStore::new());
        let module = Module::new("PUMP", "Pump maintenance");
        let mut tx = store.begin().await.unwrap();
        tx.insert_module(&module).await.unwrap();
        tx.commit().await.unwrap();

        let config = AuthoringConfig::default().with_detail_source(detail_source);
        let publisher = Publisher::new(Arc::clone(&store), Arc::new(InMemoryBlobStore::default()), config);
        (publisher, store, module)
    }

    async fn add_task(store: &InMemoryStore, module: &Module, index: u32, steps: u32) {
        let task = Task::new(module.id, index, format!("Task {}", index));
        let mut tx = store.begin().await.unwrap();
        tx.insert_task(&task).await.unwrap();
        for s in 1..=steps {
            tx.insert_step(&Step::new(module.id, Some(task.id), s, format!("Step {}.{}", index, s)))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_tasks_fails() {
        let (publisher, _, module) = setup(DetailSource::Snapshot).await;

        let err = publisher.publish(&module.id).await.unwrap_err();
        assert!(matches!(err, AuthoringError::PreconditionFailed(_)));
        assert!(publisher.list_snapshots(&module.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_versions_increase_and_status_flips() {
        let (publisher, store, module) = setup(DetailSource::Snapshot).await;
        add_task(&store, &module, 1, 2).await;

        let first = publisher.publish(&module.id).await.unwrap();
        let second = publisher.publish(&module.id).await.unwrap();
        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(first.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert!(first.verify());

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_module(&module.id).await.unwrap().unwrap().is_published());
        drop(tx);

        let versions: Vec<u32> = publisher
            .list_snapshots(&module.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, vec![2, 1]);

        let unpublished = publisher.unpublish(&module.id).await.unwrap();
        assert_eq!(unpublished.status, ModuleStatus::Draft);
    }

    #[tokio::test]
    async fn test_snapshot_detail_is_frozen() {
        let (publisher, store, module) = setup(DetailSource::Snapshot).await;
        add_task(&store, &module, 1, 1).await;
        publisher.publish(&module.id).await.unwrap();
        add_task(&store, &module, 2, 3).await;

        let detail = publisher.module_detail("PUMP").await.unwrap();
        assert_eq!(detail.step_count(), 1);

        let live = publisher.preview(&module.id).await.unwrap();
        assert_eq!(live.step_count(), 4);
    }

    #[tokio::test]
    async fn test_live_detail_reads_current_state() {
        let (publisher, store, module) = setup(DetailSource::Live).await;
        add_task(&store, &module, 1, 2).await;

        let detail = publisher.module_detail("PUMP").await.unwrap();
        assert_eq!(detail.step_count(), 2);
        assert!(matches!(
            publisher.module_detail("NOPE").await,
            Err(AuthoringError::NotFound { entity: "module", .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_mode_without_snapshot_is_not_found() {
        let (publisher, _, _) = setup(DetailSource::Snapshot).await;
        assert!(matches!(
            publisher.module_detail("PUMP").await,
            Err(AuthoringError::NotFound { entity: "snapshot", .. })
        ));
    }
}
