//! In-memory entity store for testing and embedding.
//!
//! A transaction takes an owned lock on the whole state and works on a copy,
//! which replaces the shared state on commit. Transactions are therefore
//! serialized, and an aborted transaction leaves nothing behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{AuthoringStore, StoreError, StoreTx};
use crate::types::{
    Asset, AssetId, Choice, ChoiceId, Module, ModuleId, ModuleStatus, PublishedSnapshot, Step,
    StepId, Task, TaskId,
};

/// Complete store contents.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    modules: BTreeMap<ModuleId, Module>,
    tasks: BTreeMap<TaskId, Task>,
    steps: BTreeMap<StepId, Step>,
    choices: BTreeMap<ChoiceId, Choice>,
    assets: BTreeMap<AssetId, Asset>,
    snapshots: BTreeMap<(ModuleId, u32), PublishedSnapshot>,
}

/// In-memory store.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// Remaining successful writes before an injected failure.
    fail_after: Arc<parking_lot::Mutex<Option<usize>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the write after the next `successful_writes` writes fail once.
    ///
    /// Used to prove that a failure midway through a multi-row operation
    /// leaves no partial result behind.
    pub fn fail_after_writes(&self, successful_writes: usize) {
        *self.fail_after.lock() = Some(successful_writes);
    }
}

#[async_trait]
impl AuthoringStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = (*guard).clone();
        Ok(InMemoryTx {
            guard,
            work,
            fail_after: Arc::clone(&self.fail_after),
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    fail_after: Arc<parking_lot::Mutex<Option<usize>>>,
}

impl InMemoryTx {
    fn charge_write(&self, what: &str) -> Result<(), StoreError> {
        let mut remaining = self.fail_after.lock();
        match *remaining {
            Some(0) => {
                *remaining = None;
                Err(StoreError::Injected(format!("write to {} rejected", what)))
            }
            Some(n) => {
                *remaining = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_task_slot(&self, module_id: &ModuleId, order_index: u32, except: &TaskId) -> Result<(), StoreError> {
        let taken = self.work.tasks.values().any(|t| {
            t.module_id == *module_id && t.order_index == order_index && t.id != *except
        });
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "tasks(module_id, order_index) = ({}, {})",
                module_id, order_index
            )));
        }
        Ok(())
    }

    fn check_step_slot(&self, task_id: Option<&TaskId>, order_index: u32, except: &StepId) -> Result<(), StoreError> {
        let Some(task_id) = task_id else {
            return Ok(());
        };
        let taken = self.work.steps.values().any(|s| {
            s.task_id.as_ref() == Some(task_id) && s.order_index == order_index && s.id != *except
        });
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "steps(task_id, order_index) = ({}, {})",
                task_id, order_index
            )));
        }
        Ok(())
    }

    fn check_module_code(&self, code: &str, except: &ModuleId) -> Result<(), StoreError> {
        if self.work.modules.values().any(|m| m.code == code && m.id != *except) {
            return Err(StoreError::UniqueViolation(format!("modules(code) = {}", code)));
        }
        Ok(())
    }

    fn remove_step_rows(&mut self, ids: &[StepId]) {
        for id in ids {
            self.work.steps.remove(id);
        }
        self.work.choices.retain(|_, c| !ids.contains(&c.step_id));
        for choice in self.work.choices.values_mut() {
            if choice.target.map_or(false, |t| ids.contains(&t)) {
                choice.target = None;
            }
        }
    }
}

fn newest_first<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_module(&mut self, id: &ModuleId) -> Result<Option<Module>, StoreError> {
        Ok(self.work.modules.get(id).cloned())
    }

    async fn get_module_by_code(&mut self, code: &str) -> Result<Option<Module>, StoreError> {
        Ok(self.work.modules.values().find(|m| m.code == code).cloned())
    }

    async fn list_modules(&mut self) -> Result<Vec<Module>, StoreError> {
        let rows = self.work.modules.values().cloned().collect();
        Ok(newest_first(rows, |m: &Module| (m.created_at, m.id)))
    }

    async fn list_modules_with_status(&mut self, status: ModuleStatus) -> Result<Vec<Module>, StoreError> {
        let rows = self.work.modules.values().filter(|m| m.status == status).cloned().collect();
        Ok(newest_first(rows, |m: &Module| (m.created_at, m.id)))
    }

    async fn insert_module(&mut self, module: &Module) -> Result<(), StoreError> {
        if self.work.modules.contains_key(&module.id) {
            return Err(StoreError::UniqueViolation(format!("modules(id) = {}", module.id)));
        }
        self.check_module_code(&module.code, &module.id)?;
        self.charge_write("modules")?;
        self.work.modules.insert(module.id, module.clone());
        Ok(())
    }

    async fn update_module(&mut self, module: &Module) -> Result<(), StoreError> {
        if !self.work.modules.contains_key(&module.id) {
            return Err(StoreError::MissingRow(format!("module {}", module.id)));
        }
        self.check_module_code(&module.code, &module.id)?;
        self.charge_write("modules")?;
        self.work.modules.insert(module.id, module.clone());
        Ok(())
    }

    async fn delete_module(&mut self, id: &ModuleId) -> Result<bool, StoreError> {
        if !self.work.modules.contains_key(id) {
            return Ok(false);
        }
        self.charge_write("modules")?;
        self.work.modules.remove(id);
        self.work.tasks.retain(|_, t| t.module_id != *id);
        let step_ids: Vec<StepId> = self
            .work
            .steps
            .values()
            .filter(|s| s.module_id == *id)
            .map(|s| s.id)
            .collect();
        self.remove_step_rows(&step_ids);
        self.work.snapshots.retain(|(module_id, _), _| module_id != id);
        Ok(true)
    }

    async fn get_task(&mut self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.work.tasks.get(id).cloned())
    }

    async fn list_tasks(&mut self, module_id: &ModuleId) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .work
            .tasks
            .values()
            .filter(|t| t.module_id == *module_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.order_index, t.id));
        Ok(tasks)
    }

    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError> {
        if !self.work.modules.contains_key(&task.module_id) {
            return Err(StoreError::MissingRow(format!("module {}", task.module_id)));
        }
        self.check_task_slot(&task.module_id, task.order_index, &task.id)?;
        self.charge_write("tasks")?;
        self.work.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&mut self, task: &Task) -> Result<(), StoreError> {
        self.charge_write("tasks")?;
        let row = self
            .work
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::MissingRow(format!("task {}", task.id)))?;
        row.title = task.title.clone();
        row.description = task.description.clone();
        row.updated_at = task.updated_at;
        Ok(())
    }

    async fn set_task_order(&mut self, id: &TaskId, order_index: u32) -> Result<(), StoreError> {
        let module_id = self
            .work
            .tasks
            .get(id)
            .map(|t| t.module_id)
            .ok_or_else(|| StoreError::MissingRow(format!("task {}", id)))?;
        self.check_task_slot(&module_id, order_index, id)?;
        self.charge_write("tasks")?;
        if let Some(task) = self.work.tasks.get_mut(id) {
            task.order_index = order_index;
        }
        Ok(())
    }

    async fn delete_task(&mut self, id: &TaskId) -> Result<bool, StoreError> {
        if !self.work.tasks.contains_key(id) {
            return Ok(false);
        }
        self.charge_write("tasks")?;
        self.work.tasks.remove(id);
        let step_ids: Vec<StepId> = self
            .work
            .steps
            .values()
            .filter(|s| s.task_id.as_ref() == Some(id))
            .map(|s| s.id)
            .collect();
        self.remove_step_rows(&step_ids);
        Ok(true)
    }

    async fn get_step(&mut self, id: &StepId) -> Result<Option<Step>, StoreError> {
        Ok(self.work.steps.get(id).cloned())
    }

    async fn list_task_steps(&mut self, task_id: &TaskId) -> Result<Vec<Step>, StoreError> {
        let mut steps: Vec<Step> = self
            .work
            .steps
            .values()
            .filter(|s| s.task_id.as_ref() == Some(task_id))
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.order_index, s.id));
        Ok(steps)
    }

    async fn list_module_steps(&mut self, module_id: &ModuleId) -> Result<Vec<Step>, StoreError> {
        let mut steps: Vec<Step> = self
            .work
            .steps
            .values()
            .filter(|s| s.module_id == *module_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.order_index, s.id));
        Ok(steps)
    }

    async fn insert_step(&mut self, step: &Step) -> Result<(), StoreError> {
        if !self.work.modules.contains_key(&step.module_id) {
            return Err(StoreError::MissingRow(format!("module {}", step.module_id)));
        }
        if let Some(task_id) = &step.task_id {
            if !self.work.tasks.contains_key(task_id) {
                return Err(StoreError::MissingRow(format!("task {}", task_id)));
            }
        }
        if self.work.steps.contains_key(&step.id) {
            return Err(StoreError::UniqueViolation(format!("steps(id) = {}", step.id)));
        }
        self.check_step_slot(step.task_id.as_ref(), step.order_index, &step.id)?;
        self.charge_write("steps")?;
        self.work.steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn update_step(&mut self, step: &Step) -> Result<(), StoreError> {
        self.charge_write("steps")?;
        let row = self
            .work
            .steps
            .get_mut(&step.id)
            .ok_or_else(|| StoreError::MissingRow(format!("step {}", step.id)))?;
        let (order_index, task_id, module_id, created_at) =
            (row.order_index, row.task_id, row.module_id, row.created_at);
        *row = step.clone();
        row.order_index = order_index;
        row.task_id = task_id;
        row.module_id = module_id;
        row.created_at = created_at;
        Ok(())
    }

    async fn set_step_position(&mut self, id: &StepId, order_index: u32, title: &str) -> Result<(), StoreError> {
        let task_id = self
            .work
            .steps
            .get(id)
            .map(|s| s.task_id)
            .ok_or_else(|| StoreError::MissingRow(format!("step {}", id)))?;
        self.check_step_slot(task_id.as_ref(), order_index, id)?;
        self.charge_write("steps")?;
        if let Some(step) = self.work.steps.get_mut(id) {
            step.order_index = order_index;
            step.title = title.to_string();
        }
        Ok(())
    }

    async fn delete_step(&mut self, id: &StepId) -> Result<bool, StoreError> {
        if !self.work.steps.contains_key(id) {
            return Ok(false);
        }
        self.charge_write("steps")?;
        self.remove_step_rows(&[*id]);
        Ok(true)
    }

    async fn list_choices(&mut self, step_id: &StepId) -> Result<Vec<Choice>, StoreError> {
        let mut choices: Vec<Choice> = self
            .work
            .choices
            .values()
            .filter(|c| c.step_id == *step_id)
            .cloned()
            .collect();
        choices.sort_by_key(|c| (c.order_index, c.id));
        Ok(choices)
    }

    async fn insert_choice(&mut self, choice: &Choice) -> Result<(), StoreError> {
        if !self.work.steps.contains_key(&choice.step_id) {
            return Err(StoreError::MissingRow(format!("step {}", choice.step_id)));
        }
        self.charge_write("choices")?;
        self.work.choices.insert(choice.id, choice.clone());
        Ok(())
    }

    async fn delete_choices(&mut self, step_id: &StepId) -> Result<(), StoreError> {
        self.charge_write("choices")?;
        self.work.choices.retain(|_, c| c.step_id != *step_id);
        Ok(())
    }

    async fn get_asset(&mut self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.work.assets.get(id).cloned())
    }

    async fn list_assets(&mut self) -> Result<Vec<Asset>, StoreError> {
        let rows = self.work.assets.values().cloned().collect();
        Ok(newest_first(rows, |a: &Asset| (a.created_at, a.id)))
    }

    async fn insert_asset(&mut self, asset: &Asset) -> Result<(), StoreError> {
        if self.work.assets.contains_key(&asset.id) {
            return Err(StoreError::UniqueViolation(format!("assets(id) = {}", asset.id)));
        }
        self.charge_write("assets")?;
        self.work.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn delete_asset(&mut self, id: &AssetId) -> Result<bool, StoreError> {
        if !self.work.assets.contains_key(id) {
            return Ok(false);
        }
        self.charge_write("assets")?;
        self.work.assets.remove(id);
        for module in self.work.modules.values_mut() {
            if module.thumbnail == Some(*id) {
                module.thumbnail = None;
            }
        }
        for step in self.work.steps.values_mut() {
            step.clear_asset(*id);
        }
        Ok(true)
    }

    async fn latest_snapshot_version(&mut self, module_id: &ModuleId) -> Result<Option<u32>, StoreError> {
        Ok(self
            .work
            .snapshots
            .keys()
            .filter(|(m, _)| m == module_id)
            .map(|(_, v)| *v)
            .max())
    }

    async fn latest_snapshot(&mut self, module_id: &ModuleId) -> Result<Option<PublishedSnapshot>, StoreError> {
        Ok(self
            .work
            .snapshots
            .range((*module_id, 0)..=(*module_id, u32::MAX))
            .next_back()
            .map(|(_, s)| s.clone()))
    }

    async fn list_snapshots(&mut self, module_id: &ModuleId) -> Result<Vec<PublishedSnapshot>, StoreError> {
        Ok(self
            .work
            .snapshots
            .range((*module_id, 0)..=(*module_id, u32::MAX))
            .rev()
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn insert_snapshot(&mut self, snapshot: &PublishedSnapshot) -> Result<(), StoreError> {
        let key = (snapshot.module_id, snapshot.version);
        if self.work.snapshots.contains_key(&key) {
            return Err(StoreError::UniqueViolation(format!(
                "snapshots(module_id, version) = ({}, {})",
                snapshot.module_id, snapshot.version
            )));
        }
        if !self.work.modules.contains_key(&snapshot.module_id) {
            return Err(StoreError::MissingRow(format!("module {}", snapshot.module_id)));
        }
        self.charge_write("snapshots")?;
        self.work.snapshots.insert(key, snapshot.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let Self { mut guard, work, .. } = self;
        *guard = work;
        Ok(())
    }
}
