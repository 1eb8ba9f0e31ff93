//! Scenario tests for the ordering engine.
//!
//! Each test builds a module through the public services and checks the
//! resulting positions and titles against the in-memory store.

use std::sync::Arc;

use training_authoring::{
    AuthoringError, AuthoringService, AuthoringStore, ChoiceInput, InMemoryStore, ModuleDraft,
    ModuleId, OrderingEngine, Step, StepId, StoreTx, Task, TaskId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: OrderingEngine<InMemoryStore>,
    authoring: AuthoringService<InMemoryStore>,
    module: ModuleId,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let authoring = AuthoringService::new(Arc::clone(&store));
        let module = authoring
            .create_module(ModuleDraft::titled("Pump maintenance"), None)
            .await
            .unwrap()
            .id;
        Self {
            engine: OrderingEngine::new(Arc::clone(&store)),
            store,
            authoring,
            module,
        }
    }

    /// Append a task with `n` generated steps.
    async fn task_with_steps(&self, title: &str, n: usize) -> (Task, Vec<Step>) {
        let task = self.engine.insert_task(&self.module, None, title, None).await.unwrap();
        let mut steps = Vec::new();
        for _ in 0..n {
            steps.push(self.engine.insert_step(&task.id, None, None).await.unwrap());
        }
        (task, steps)
    }

    async fn steps(&self, task: &TaskId) -> Vec<Step> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_task_steps(task).await.unwrap()
    }

    async fn titles(&self, task: &TaskId) -> Vec<String> {
        self.steps(task).await.into_iter().map(|s| s.title).collect()
    }

    async fn tasks(&self) -> Vec<Task> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_tasks(&self.module).await.unwrap()
    }

    async fn module_step_ids(&self) -> Vec<StepId> {
        let mut ids = Vec::new();
        for task in self.tasks().await {
            ids.extend(self.steps(&task.id).await.into_iter().map(|s| s.id));
        }
        ids
    }
}

fn indices_of(steps: &[Step]) -> Vec<u32> {
    steps.iter().map(|s| s.order_index).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Step operations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_insert_at_two_shifts_generated_titles() {
    let fx = Fixture::new().await;
    let (task, _) = fx.task_with_steps("Prepare", 3).await;
    assert_eq!(fx.titles(&task.id).await, vec!["Step 1.1", "Step 1.2", "Step 1.3"]);

    let new = fx.engine.insert_step(&task.id, Some(2), None).await.unwrap();

    let steps = fx.steps(&task.id).await;
    assert_eq!(indices_of(&steps), vec![1, 2, 3, 4]);
    assert_eq!(steps[1].id, new.id);
    assert_eq!(fx.titles(&task.id).await, vec!["Step 1.1", "Step 1.2", "Step 1.3", "Step 1.4"]);
}

#[tokio::test]
async fn test_insert_keeps_custom_and_legacy_forms() {
    let fx = Fixture::new().await;
    let (task, _) = fx.task_with_steps("Prepare", 0).await;
    fx.engine.insert_step(&task.id, None, Some("Open the panel")).await.unwrap();
    fx.engine.insert_step(&task.id, None, Some("Step 2")).await.unwrap();

    fx.engine.insert_step(&task.id, Some(1), Some("Safety first")).await.unwrap();

    assert_eq!(
        fx.titles(&task.id).await,
        vec!["Safety first", "Open the panel", "Step 3"]
    );
}

#[tokio::test]
async fn test_delete_rewrites_generated_titles_only() {
    let fx = Fixture::new().await;
    fx.task_with_steps("Intro", 1).await;
    let (task, _) = fx.task_with_steps("Prepare", 0).await;
    assert_eq!(task.order_index, 2);

    let first = fx.engine.insert_step(&task.id, None, None).await.unwrap();
    fx.engine.insert_step(&task.id, None, Some("My custom title")).await.unwrap();
    fx.engine.insert_step(&task.id, None, None).await.unwrap();
    assert_eq!(fx.titles(&task.id).await, vec!["Step 2.1", "My custom title", "Step 2.3"]);

    fx.engine.delete_step(&first.id).await.unwrap();

    let steps = fx.steps(&task.id).await;
    assert_eq!(indices_of(&steps), vec![1, 2]);
    assert_eq!(fx.titles(&task.id).await, vec!["My custom title", "Step 2.2"]);
}

#[tokio::test]
async fn test_duplicate_at_two() {
    let fx = Fixture::new().await;
    let (task, steps) = fx.task_with_steps("Prepare", 3).await;
    let original = &steps[1];

    fx.authoring
        .set_choices(
            &original.id,
            vec![
                ChoiceInput { label: "Retry".to_string(), target: Some(steps[0].id) },
                ChoiceInput { label: "Skip".to_string(), target: Some(steps[2].id) },
            ],
        )
        .await
        .unwrap();

    let copy = fx.engine.duplicate_step(&original.id).await.unwrap();

    let after = fx.steps(&task.id).await;
    let order: Vec<StepId> = after.iter().map(|s| s.id).collect();
    assert_eq!(order, vec![steps[0].id, original.id, copy.id, steps[2].id]);
    assert_eq!(indices_of(&after), vec![1, 2, 3, 4]);
    assert_eq!(
        fx.titles(&task.id).await,
        vec!["Step 1.1", "Step 1.2", "Step 1.2 (copy)", "Step 1.4"]
    );

    let source_choices = fx.authoring.list_choices(&original.id).await.unwrap();
    let copy_choices = fx.authoring.list_choices(&copy.id).await.unwrap();
    assert_eq!(source_choices.len(), copy_choices.len());
    for (a, b) in source_choices.iter().zip(&copy_choices) {
        assert_eq!((&a.label, a.target, a.order_index), (&b.label, b.target, b.order_index));
        assert_ne!(a.id, b.id);
        assert_eq!(b.step_id, copy.id);
    }
}

#[tokio::test]
async fn test_identity_reorder_changes_nothing() {
    let fx = Fixture::new().await;
    let (first, _) = fx.task_with_steps("Prepare", 2).await;
    let (second, _) = fx.task_with_steps("Operate", 3).await;
    // A legacy title would be canonicalised by a real move; identity must not touch it.
    fx.engine.insert_step(&second.id, None, Some("step 4")).await.unwrap();

    let before_first = fx.steps(&first.id).await;
    let before_second = fx.steps(&second.id).await;

    let ids = fx.module_step_ids().await;
    fx.engine.reorder_steps(&fx.module, &ids).await.unwrap();

    assert_eq!(fx.steps(&first.id).await, before_first);
    assert_eq!(fx.steps(&second.id).await, before_second);

    let tasks: Vec<TaskId> = fx.tasks().await.iter().map(|t| t.id).collect();
    fx.engine.reorder_tasks(&fx.module, &tasks).await.unwrap();
    assert_eq!(fx.tasks().await.iter().map(|t| t.order_index).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_reverse_reorder_across_tasks() {
    let fx = Fixture::new().await;
    let (first, _) = fx.task_with_steps("Prepare", 3).await;
    let (second, _) = fx.task_with_steps("Operate", 2).await;

    let mut ids = fx.module_step_ids().await;
    ids.reverse();
    fx.engine.reorder_steps(&fx.module, &ids).await.unwrap();

    assert_eq!(indices_of(&fx.steps(&first.id).await), vec![1, 2, 3]);
    assert_eq!(indices_of(&fx.steps(&second.id).await), vec![1, 2]);
    // Rows moved, titles follow the new positions.
    assert_eq!(fx.titles(&first.id).await, vec!["Step 1.1", "Step 1.2", "Step 1.3"]);

    let moved = fx.steps(&first.id).await;
    let original_ids: Vec<StepId> = ids.iter().rev().take(3).copied().collect();
    assert_eq!(moved[0].id, original_ids[2]);
    assert_eq!(moved[2].id, original_ids[0]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Task operations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_task_cascades_embedded_index_filter() {
    let fx = Fixture::new().await;
    let (first, _) = fx.task_with_steps("Intro", 1).await;
    let (_second, _) = fx.task_with_steps("Prepare", 1).await;
    let (third, _) = fx.task_with_steps("Operate", 2).await;
    fx.engine.insert_step(&third.id, None, Some("Step 5.9")).await.unwrap();
    fx.engine.insert_step(&third.id, None, Some("Wrap up")).await.unwrap();

    fx.engine.delete_task(&first.id).await.unwrap();

    let tasks = fx.tasks().await;
    assert_eq!(tasks.iter().map(|t| t.order_index).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(tasks[1].id, third.id);
    assert_eq!(
        fx.titles(&third.id).await,
        vec!["Step 2.1", "Step 2.2", "Step 5.9", "Wrap up"]
    );
    assert_eq!(fx.titles(&tasks[0].id).await, vec!["Step 1.1"]);
}

#[tokio::test]
async fn test_reorder_tasks_rejects_foreign_ids() {
    let fx = Fixture::new().await;
    let (a, _) = fx.task_with_steps("A", 0).await;
    let (b, _) = fx.task_with_steps("B", 0).await;

    for bad in [vec![a.id], vec![a.id, a.id], vec![a.id, b.id, TaskId::generate()]] {
        let err = fx.engine.reorder_tasks(&fx.module, &bad).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)), "{bad:?}");
    }

    fx.engine.reorder_tasks(&fx.module, &[b.id, a.id]).await.unwrap();
    let tasks = fx.tasks().await;
    assert_eq!((tasks[0].id, tasks[1].id), (b.id, a.id));
}

// ─────────────────────────────────────────────────────────────────────────────
// Atomicity
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_insert_leaves_no_partial_shift() {
    let fx = Fixture::new().await;
    let (task, _) = fx.task_with_steps("Prepare", 3).await;
    let before = fx.steps(&task.id).await;

    // Two of three shifts succeed, the third write fails.
    fx.store.fail_after_writes(2);
    let err = fx.engine.insert_step(&task.id, Some(1), None).await.unwrap_err();
    assert!(matches!(err, AuthoringError::Storage(_)));

    assert_eq!(fx.steps(&task.id).await, before);
}

#[tokio::test]
async fn test_failed_task_delete_is_rolled_back() {
    let fx = Fixture::new().await;
    let (first, _) = fx.task_with_steps("Intro", 1).await;
    fx.task_with_steps("Prepare", 2).await;
    let before = fx.tasks().await;

    // Delete succeeds, the shift of the following task fails.
    fx.store.fail_after_writes(1);
    assert!(fx.engine.delete_task(&first.id).await.is_err());

    assert_eq!(fx.tasks().await, before);
    assert_eq!(fx.titles(&before[1].id).await, vec!["Step 2.1", "Step 2.2"]);
}

#[tokio::test]
async fn test_duplicate_requires_task() {
    let fx = Fixture::new().await;
    let loose = Step::new(fx.module, None, 1, "Loose");
    {
        let mut tx = fx.store.begin().await.unwrap();
        tx.insert_step(&loose).await.unwrap();
        tx.commit().await.unwrap();
    }

    let err = fx.engine.duplicate_step(&loose.id).await.unwrap_err();
    assert!(matches!(err, AuthoringError::PreconditionFailed(_)));
}
