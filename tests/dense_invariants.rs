//! Property tests: positions stay dense under arbitrary edit sequences.

use std::sync::Arc;

use proptest::prelude::*;
use training_authoring::{
    AuthoringService, AuthoringStore, InMemoryStore, ModuleDraft, ModuleId, OrderingEngine,
    StepId, StoreTx, Task, TaskId,
};

#[derive(Debug, Clone)]
enum Op {
    InsertStep { task: usize, position: Option<u32> },
    DeleteStep { pick: usize },
    DuplicateStep { pick: usize },
    RotateSteps { by: usize },
    InsertTask { position: Option<u32> },
    DeleteTask { pick: usize },
    RotateTasks { by: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), proptest::option::of(1u32..8))
            .prop_map(|(task, position)| Op::InsertStep { task, position }),
        2 => any::<usize>().prop_map(|pick| Op::DeleteStep { pick }),
        1 => any::<usize>().prop_map(|pick| Op::DuplicateStep { pick }),
        1 => (0usize..6).prop_map(|by| Op::RotateSteps { by }),
        2 => proptest::option::of(1u32..6).prop_map(|position| Op::InsertTask { position }),
        1 => any::<usize>().prop_map(|pick| Op::DeleteTask { pick }),
        1 => (0usize..4).prop_map(|by| Op::RotateTasks { by }),
    ]
}

struct World {
    store: Arc<InMemoryStore>,
    engine: OrderingEngine<InMemoryStore>,
    module: ModuleId,
}

impl World {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let module = AuthoringService::new(Arc::clone(&store))
            .create_module(ModuleDraft::titled("Property module"), None)
            .await
            .unwrap()
            .id;
        Self {
            engine: OrderingEngine::new(Arc::clone(&store)),
            store,
            module,
        }
    }

    async fn layout(&self) -> Vec<(Task, Vec<(StepId, u32)>)> {
        let mut tx = self.store.begin().await.unwrap();
        let mut out = Vec::new();
        for task in tx.list_tasks(&self.module).await.unwrap() {
            let steps = tx
                .list_task_steps(&task.id)
                .await
                .unwrap()
                .into_iter()
                .map(|s| (s.id, s.order_index))
                .collect();
            out.push((task, steps));
        }
        out
    }

    async fn step_ids(&self) -> Vec<StepId> {
        self.layout()
            .await
            .into_iter()
            .flat_map(|(_, steps)| steps.into_iter().map(|(id, _)| id))
            .collect()
    }

    async fn task_ids(&self) -> Vec<TaskId> {
        self.layout().await.into_iter().map(|(t, _)| t.id).collect()
    }

    async fn apply(&self, op: &Op) {
        match op {
            Op::InsertStep { task, position } => {
                let tasks = self.task_ids().await;
                if !tasks.is_empty() {
                    let id = tasks[task % tasks.len()];
                    self.engine.insert_step(&id, *position, None).await.unwrap();
                }
            }
            Op::DeleteStep { pick } => {
                let steps = self.step_ids().await;
                if !steps.is_empty() {
                    self.engine.delete_step(&steps[pick % steps.len()]).await.unwrap();
                }
            }
            Op::DuplicateStep { pick } => {
                let steps = self.step_ids().await;
                if !steps.is_empty() {
                    self.engine.duplicate_step(&steps[pick % steps.len()]).await.unwrap();
                }
            }
            Op::RotateSteps { by } => {
                let mut steps = self.step_ids().await;
                if !steps.is_empty() {
                    let n = steps.len();
                    steps.rotate_left(by % n);
                    self.engine.reorder_steps(&self.module, &steps).await.unwrap();
                }
            }
            Op::InsertTask { position } => {
                self.engine
                    .insert_task(&self.module, *position, "Generated", None)
                    .await
                    .unwrap();
            }
            Op::DeleteTask { pick } => {
                let tasks = self.task_ids().await;
                if !tasks.is_empty() {
                    self.engine.delete_task(&tasks[pick % tasks.len()]).await.unwrap();
                }
            }
            Op::RotateTasks { by } => {
                let mut tasks = self.task_ids().await;
                if !tasks.is_empty() {
                    let n = tasks.len();
                    tasks.rotate_left(by % n);
                    self.engine.reorder_tasks(&self.module, &tasks).await.unwrap();
                }
            }
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: task and step positions are exactly 1..=n after every operation
    #[test]
    fn positions_stay_dense(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let rt = runtime();
        let violations = rt.block_on(async {
            let world = World::new().await;
            let mut violations = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                world.apply(op).await;
                for (pos, (task, steps)) in world.layout().await.iter().enumerate() {
                    if task.order_index as usize != pos + 1 {
                        violations.push(format!("after op {} {:?}: task at {} has index {}", i, op, pos + 1, task.order_index));
                    }
                    let indices: Vec<u32> = steps.iter().map(|(_, idx)| *idx).collect();
                    let expected: Vec<u32> = (1..=steps.len() as u32).collect();
                    if indices != expected {
                        violations.push(format!("after op {} {:?}: step indices {:?}", i, op, indices));
                    }
                }
            }
            violations
        });
        prop_assert!(violations.is_empty(), "{:#?}", violations);
    }

    /// Property: after a title repair, no generated title is out of place
    #[test]
    fn repair_leaves_nothing_to_repair(ops in proptest::collection::vec(op_strategy(), 1..30)) {
        let rt = runtime();
        let remaining = rt.block_on(async {
            let world = World::new().await;
            for op in &ops {
                world.apply(op).await;
            }
            world.engine.repair_titles(Some(&world.module), true).await.unwrap();
            world.engine.repair_titles(Some(&world.module), false).await.unwrap()
        });
        prop_assert!(remaining.is_empty(), "{:?}", remaining);
    }
}
