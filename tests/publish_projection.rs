//! End-to-end tests: author a module, publish it, read it back.

use std::sync::Arc;

use serde_json::json;
use training_authoring::{
    AssetLibrary, AssetType, AssetUpload, AuthoringConfig, AuthoringError, AuthoringService,
    AuthoringStore, BlobStore, CatalogProjection, ChoiceInput, DetailSource, InMemoryBlobStore,
    InMemoryStore, InstructionType, MediaType, ModelPlacement, Module, ModuleDraft,
    OrderingEngine, Publisher, StepContent, StoreTx,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Stack {
    store: Arc<InMemoryStore>,
    blobs: Arc<InMemoryBlobStore>,
    authoring: AuthoringService<InMemoryStore>,
    engine: OrderingEngine<InMemoryStore>,
    assets: AssetLibrary<InMemoryStore, InMemoryBlobStore>,
    publisher: Publisher<InMemoryStore, InMemoryBlobStore>,
    catalog: CatalogProjection<InMemoryStore, InMemoryBlobStore>,
}

impl Stack {
    fn new(detail_source: DetailSource) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new("/media/"));
        let config = AuthoringConfig::default().with_detail_source(detail_source);
        Self {
            authoring: AuthoringService::new(Arc::clone(&store)),
            engine: OrderingEngine::new(Arc::clone(&store)),
            assets: AssetLibrary::new(Arc::clone(&store), Arc::clone(&blobs), config.clone()),
            publisher: Publisher::new(Arc::clone(&store), Arc::clone(&blobs), config.clone()),
            catalog: CatalogProjection::new(Arc::clone(&store), Arc::clone(&blobs), config),
            store,
            blobs,
        }
    }

    async fn module(&self, title: &str) -> Module {
        self.authoring
            .create_module(ModuleDraft::titled(title), None)
            .await
            .unwrap()
    }

    async fn store_counts(&self, module: &Module) -> (usize, usize) {
        let mut tx = self.store.begin().await.unwrap();
        let tasks = tx.list_tasks(&module.id).await.unwrap();
        let mut steps = 0;
        for task in &tasks {
            steps += tx.list_task_steps(&task.id).await.unwrap().len();
        }
        (tasks.len(), steps)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publish
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_global_ids_ignore_local_indices() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Pump maintenance").await;
    let a = stack.engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
    let b = stack.engine.insert_task(&module.id, None, "Operate", None).await.unwrap();
    let s1 = stack.engine.insert_step(&a.id, None, Some("s1")).await.unwrap();
    let s2 = stack.engine.insert_step(&a.id, None, Some("s2")).await.unwrap();
    let s3 = stack.engine.insert_step(&b.id, None, Some("s3")).await.unwrap();
    assert_eq!(s3.order_index, 1);

    stack.publisher.publish(&module.id).await.unwrap();
    let doc = stack.publisher.module_detail(&module.code).await.unwrap();

    let ids: Vec<(String, u32)> = doc.steps().map(|s| (s.title.clone(), s.step_id)).collect();
    assert_eq!(
        ids,
        vec![("s1".to_string(), 1), ("s2".to_string(), 2), ("s3".to_string(), 3)]
    );
    assert_eq!(doc.tasks[0].task_id, 1);
    assert_eq!(doc.tasks[1].task_title, "Task 2: Operate");
    let _ = (s1, s2);
}

#[tokio::test]
async fn test_published_counts_match_store() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Valve check").await;
    for (title, n) in [("Prepare", 3), ("Inspect", 0), ("Close", 2)] {
        let task = stack.engine.insert_task(&module.id, None, title, None).await.unwrap();
        for _ in 0..n {
            stack.engine.insert_step(&task.id, None, None).await.unwrap();
        }
    }
    let expected = stack.store_counts(&module).await;

    let snapshot = stack.publisher.publish(&module.id).await.unwrap();
    let doc = snapshot.document().unwrap();

    assert_eq!((doc.task_count(), doc.step_count()), expected);
    assert_eq!(expected, (3, 5));
}

#[tokio::test]
async fn test_deleted_choice_target_resolves_to_zero() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Branching").await;
    let task = stack.engine.insert_task(&module.id, None, "Decide", None).await.unwrap();
    let question = stack.engine.insert_step(&task.id, None, Some("Ready?")).await.unwrap();
    let yes = stack.engine.insert_step(&task.id, None, None).await.unwrap();
    let no = stack.engine.insert_step(&task.id, None, None).await.unwrap();

    let mut content = StepContent::of(&question);
    content.instruction_type = InstructionType::Question;
    stack.authoring.update_step_content(&question.id, content).await.unwrap();
    stack
        .authoring
        .set_choices(
            &question.id,
            vec![
                ChoiceInput { label: "Yes".to_string(), target: Some(yes.id) },
                ChoiceInput { label: "No".to_string(), target: Some(no.id) },
            ],
        )
        .await
        .unwrap();

    stack.engine.delete_step(&yes.id).await.unwrap();
    stack.publisher.publish(&module.id).await.unwrap();

    let payload = serde_json::to_value(stack.publisher.module_detail(&module.code).await.unwrap()).unwrap();
    assert_eq!(
        payload["tasks"][0]["steps"][0]["choices"],
        json!([
            { "label": "Yes", "goToStepId": 0 },
            { "label": "No", "goToStepId": 2 },
        ])
    );
    // "No" moved up into position 2 after the delete.
    assert_eq!(payload["tasks"][0]["steps"][1]["title"], "Step 1.2");
}

#[tokio::test]
async fn test_snapshots_are_immutable_and_versioned() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Pump").await;
    let task = stack.engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
    stack.engine.insert_step(&task.id, None, None).await.unwrap();

    let v1 = stack.publisher.publish(&module.id).await.unwrap();
    stack.engine.insert_step(&task.id, None, None).await.unwrap();
    let v2 = stack.publisher.publish(&module.id).await.unwrap();

    assert_eq!((v1.version, v2.version), (1, 2));
    assert_ne!(v1.content_hash, v2.content_hash);

    let listed = stack.publisher.list_snapshots(&module.id).await.unwrap();
    assert_eq!(listed[1], v1);
    assert!(listed.iter().all(|s| s.verify()));
}

#[tokio::test]
async fn test_empty_module_cannot_be_published() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Empty").await;

    let err = stack.publisher.publish(&module.id).await.unwrap_err();
    assert!(matches!(err, AuthoringError::PreconditionFailed(_)));
    assert!(!stack.authoring.get_module(&module.id).await.unwrap().is_published());
}

// ─────────────────────────────────────────────────────────────────────────────
// Assets in documents
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_asset_delete_nulls_references() {
    let stack = Stack::new(DetailSource::Live);
    let module = stack.module("Assets").await;
    let task = stack.engine.insert_task(&module.id, None, "Look", None).await.unwrap();
    let step = stack.engine.insert_step(&task.id, None, None).await.unwrap();

    let image = stack
        .assets
        .upload(AssetUpload {
            filename: "gauge.png".to_string(),
            asset_type: AssetType::Image,
            bytes: vec![1, 2, 3],
            mime_type: None,
            metadata: Some(json!({ "width": 64 })),
        })
        .await
        .unwrap();
    let model = stack
        .assets
        .upload(AssetUpload {
            filename: "pump.glb".to_string(),
            asset_type: AssetType::Gltf,
            bytes: vec![0; 16],
            mime_type: None,
            metadata: None,
        })
        .await
        .unwrap();

    let mut content = StepContent::of(&step);
    content.media_type = Some(MediaType::Image);
    content.media_asset = Some(image.id);
    content.models = vec![ModelPlacement::of(model.id)];
    stack.authoring.update_step_content(&step.id, content).await.unwrap();

    let doc = stack.publisher.module_detail(&module.code).await.unwrap();
    let projected = &doc.tasks[0].steps[0];
    assert_eq!(projected.media.as_ref().unwrap().path, stack.blobs.url_of(&image.id));
    assert_eq!(projected.models.len(), 1);

    stack.assets.delete(&image.id).await.unwrap();
    stack.assets.delete(&model.id).await.unwrap();

    let stored = stack.authoring.get_step(&step.id).await.unwrap();
    assert_eq!(stored.media_asset, None);
    assert_eq!(stored.models[0].asset, None);

    let doc = stack.publisher.module_detail(&module.code).await.unwrap();
    assert!(doc.tasks[0].steps[0].media.is_none());
    assert!(doc.tasks[0].steps[0].models.is_empty());
    assert!(!stack.blobs.contains(&image.id));
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_catalog_tracks_publish_state() {
    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Fire Safety 101").await;
    let task = stack.engine.insert_task(&module.id, None, "Evacuate", None).await.unwrap();
    stack.engine.insert_step(&task.id, None, None).await.unwrap();

    assert!(stack.catalog.catalog().await.unwrap().modules.is_empty());

    stack.publisher.publish(&module.id).await.unwrap();
    // Edits after publish show up in catalog counts.
    stack.engine.insert_step(&task.id, None, None).await.unwrap();

    let catalog = serde_json::to_value(stack.catalog.catalog().await.unwrap()).unwrap();
    let entry = &catalog["modules"][0];
    assert_eq!(entry["moduleId"], "FIRE_SAFETY_101");
    assert_eq!(entry["jsonPath"], "/api/unity/modules/FIRE_SAFETY_101/");
    assert_eq!(entry["taskCount"], 1);
    assert_eq!(entry["stepCount"], 2);
    assert_eq!(entry["thumbnail"], "");
    assert_eq!(entry["mode"], "VR");

    stack.publisher.unpublish(&module.id).await.unwrap();
    assert!(stack.catalog.catalog().await.unwrap().modules.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_get_distinct_versions() {
    const PUBLISHES: u32 = 16;

    let stack = Stack::new(DetailSource::Snapshot);
    let module = stack.module("Concurrent").await;
    let task = stack.engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
    stack.engine.insert_step(&task.id, None, None).await.unwrap();

    let publisher = Arc::new(Publisher::new(
        Arc::clone(&stack.store),
        Arc::clone(&stack.blobs),
        AuthoringConfig::default(),
    ));

    let handles: Vec<_> = (0..PUBLISHES)
        .map(|_| {
            let publisher = Arc::clone(&publisher);
            let module_id = module.id;
            tokio::spawn(async move { publisher.publish(&module_id).await })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().version);
    }
    versions.sort_unstable();

    assert_eq!(versions, (1..=PUBLISHES).collect::<Vec<_>>());
    let listed = stack.publisher.list_snapshots(&module.id).await.unwrap();
    assert_eq!(listed.len(), PUBLISHES as usize);
    assert_eq!(listed[0].version, PUBLISHES);
}
