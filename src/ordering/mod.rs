//! Ordering engine.
//!
//! Maintains dense 1-based `order_index` values for tasks within a module and
//! steps within a task, and keeps generated step titles in step with their
//! position. Every operation runs in one transaction: either all of its
//! shifts land or none do.
//!
//! ## Title rules
//!
//! | Operation        | Rows touched               | Generated titles become        |
//! |------------------|----------------------------|--------------------------------|
//! | insert/delete    | later steps of the task    | same form, new step component  |
//! | reorder steps    | every step of the module   | `Step {task}.{new}`            |
//! | delete/insert task | later tasks              | `Step {old}.{n}` → `Step {new}.{n}` |
//! | reorder tasks    | every task of the module   | unchanged                      |
//!
//! Custom titles are never rewritten.

pub mod renumber;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{AuthoringError, AuthoringResult};
use crate::store::{AuthoringStore, StoreTx};
use crate::title::{copy_title, generated_title, repaired_title};
use crate::types::{ModuleId, Step, StepId, Task, TaskId};

pub use renumber::{SiblingScope, StepScope, TaskScope};

/// A generated title that disagrees with its step's actual position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRepair {
    /// Module of the step.
    pub module_id: ModuleId,
    /// The step.
    pub step_id: StepId,
    /// Current title.
    pub old_title: String,
    /// Title matching the position.
    pub new_title: String,
}

/// Ordering engine over an authoring store.
pub struct OrderingEngine<S: AuthoringStore> {
    store: Arc<S>,
}

impl<S: AuthoringStore> Clone for OrderingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AuthoringStore + 'static> OrderingEngine<S> {
    /// Create an engine over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────

    /// Insert a new step into a task.
    ///
    /// With a position, steps at or after it shift up by one. A position past
    /// the end appends. Without an explicit title (or with a blank one) the
    /// step gets `"Step {task}.{index}"`.
    pub async fn insert_step(
        &self,
        task_id: &TaskId,
        position: Option<u32>,
        title: Option<&str>,
    ) -> AuthoringResult<Step> {
        let mut tx = self.store.begin().await?;
        let task = load_task(&mut tx, task_id).await?;
        let scope = StepScope::of(&task);

        let index = insertion_index(&scope, &mut tx, position).await?;
        let shifted = renumber::open_gap(&scope, &mut tx, index).await?;

        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => generated_title(task.order_index, index),
        };
        let step = Step::new(task.module_id, Some(task.id), index, title);
        tx.insert_step(&step).await?;
        tx.commit().await?;

        tracing::info!(
            module_id = %task.module_id,
            task_id = %task.id,
            step_id = %step.id,
            order_index = index,
            shifted,
            "Step inserted"
        );
        Ok(step)
    }

    /// Delete a step and close the gap it leaves in its task.
    pub async fn delete_step(&self, step_id: &StepId) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        let step = tx
            .get_step(step_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("step", step_id))?;

        tx.delete_step(&step.id).await?;

        let mut shifted = 0;
        if let Some(task_id) = step.task_id {
            let task = load_task(&mut tx, &task_id).await?;
            shifted = renumber::close_gap(&StepScope::of(&task), &mut tx, step.order_index).await?;
        }
        tx.commit().await?;

        tracing::info!(
            module_id = %step.module_id,
            step_id = %step.id,
            order_index = step.order_index,
            shifted,
            "Step deleted"
        );
        Ok(())
    }

    /// Reorder every step of a module.
    ///
    /// `ordered` must list each step of the module exactly once. Within each
    /// task, steps take positions 1..n in the order they appear. Steps without
    /// a task keep their index. Generated titles become
    /// `"Step {task}.{index}"`.
    pub async fn reorder_steps(&self, module_id: &ModuleId, ordered: &[StepId]) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        load_module_exists(&mut tx, module_id).await?;

        let steps = tx.list_module_steps(module_id).await?;
        let mut by_id: HashMap<StepId, Step> = steps.into_iter().map(|s| (s.id, s)).collect();
        ensure_permutation("step", ordered, by_id.keys().copied())?;

        let mut groups: HashMap<TaskId, Vec<Step>> = HashMap::new();
        let mut group_order: Vec<TaskId> = Vec::new();
        for id in ordered {
            let Some(step) = by_id.remove(id) else { continue };
            if let Some(task_id) = step.task_id {
                if !groups.contains_key(&task_id) {
                    group_order.push(task_id);
                }
                groups.entry(task_id).or_default().push(step);
            }
        }

        let mut moved_tasks = 0;
        for task_id in group_order {
            let task = load_task(&mut tx, &task_id).await?;
            let group = groups.remove(&task_id).unwrap_or_default();
            if renumber::reorder(&StepScope::of(&task), &mut tx, &group).await? {
                moved_tasks += 1;
            }
        }
        tx.commit().await?;

        tracing::info!(
            module_id = %module_id,
            steps = ordered.len(),
            tasks_reordered = moved_tasks,
            "Steps reordered"
        );
        Ok(())
    }

    /// Duplicate a step right after itself.
    ///
    /// Content is copied; choices are deep-copied as new rows with the same
    /// labels, targets and order. The copy is titled `"{original} (copy)"`.
    pub async fn duplicate_step(&self, step_id: &StepId) -> AuthoringResult<Step> {
        let mut tx = self.store.begin().await?;
        let source = tx
            .get_step(step_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("step", step_id))?;
        let task_id = source.task_id.ok_or_else(|| {
            AuthoringError::PreconditionFailed(format!("step {} has no task to duplicate into", source.id))
        })?;
        let task = load_task(&mut tx, &task_id).await?;

        let index = source.order_index + 1;
        let shifted = renumber::open_gap(&StepScope::of(&task), &mut tx, index).await?;

        let copy = source.duplicate_content(index, copy_title(&source.title));
        tx.insert_step(&copy).await?;

        let choices = tx.list_choices(&source.id).await?;
        for choice in &choices {
            tx.insert_choice(&choice.copy_to(copy.id)).await?;
        }
        tx.commit().await?;

        tracing::info!(
            module_id = %copy.module_id,
            source_step_id = %source.id,
            step_id = %copy.id,
            order_index = index,
            choices = choices.len(),
            shifted,
            "Step duplicated"
        );
        Ok(copy)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────

    /// Insert a new task into a module.
    ///
    /// With a position, tasks at or after it shift up by one and their steps'
    /// `"Step {old}.{n}"` titles follow. A position past the end appends.
    pub async fn insert_task(
        &self,
        module_id: &ModuleId,
        position: Option<u32>,
        title: &str,
        description: Option<&str>,
    ) -> AuthoringResult<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AuthoringError::validation("task title is required"));
        }

        let mut tx = self.store.begin().await?;
        load_module_exists(&mut tx, module_id).await?;
        let scope = TaskScope::of(*module_id);

        let index = insertion_index(&scope, &mut tx, position).await?;
        let shifted = renumber::open_gap(&scope, &mut tx, index).await?;

        let mut task = Task::new(*module_id, index, title);
        task.description = description.map(str::to_string);
        tx.insert_task(&task).await?;
        tx.commit().await?;

        tracing::info!(
            module_id = %module_id,
            task_id = %task.id,
            order_index = index,
            shifted,
            "Task inserted"
        );
        Ok(task)
    }

    /// Delete a task with its steps and close the gap it leaves.
    pub async fn delete_task(&self, task_id: &TaskId) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        let task = load_task(&mut tx, task_id).await?;

        tx.delete_task(&task.id).await?;
        let shifted = renumber::close_gap(&TaskScope::of(task.module_id), &mut tx, task.order_index).await?;
        tx.commit().await?;

        tracing::info!(
            module_id = %task.module_id,
            task_id = %task.id,
            order_index = task.order_index,
            shifted,
            "Task deleted"
        );
        Ok(())
    }

    /// Reorder the tasks of a module.
    ///
    /// `ordered` must list each task of the module exactly once. Step titles
    /// are left as they are; [`OrderingEngine::repair_titles`] brings them back
    /// in line.
    pub async fn reorder_tasks(&self, module_id: &ModuleId, ordered: &[TaskId]) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        load_module_exists(&mut tx, module_id).await?;

        let tasks = tx.list_tasks(module_id).await?;
        let mut by_id: HashMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        ensure_permutation("task", ordered, by_id.keys().copied())?;

        let sequence: Vec<Task> = ordered.iter().filter_map(|id| by_id.remove(id)).collect();
        let moved = renumber::reorder(&TaskScope::of(*module_id), &mut tx, &sequence).await?;
        tx.commit().await?;

        tracing::info!(module_id = %module_id, tasks = sequence.len(), moved, "Tasks reordered");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Find two-part generated titles that disagree with their position.
    ///
    /// Scans one module, or every module when `module_id` is `None`. With
    /// `apply`, the titles are rewritten in the same transaction.
    pub async fn repair_titles(&self, module_id: Option<&ModuleId>, apply: bool) -> AuthoringResult<Vec<TitleRepair>> {
        let mut tx = self.store.begin().await?;

        let modules = match module_id {
            Some(id) => vec![load_module_exists(&mut tx, id).await?],
            None => tx.list_modules().await?.into_iter().map(|m| m.id).collect(),
        };

        let mut repairs = Vec::new();
        for module_id in modules {
            for task in tx.list_tasks(&module_id).await? {
                for step in tx.list_task_steps(&task.id).await? {
                    if let Some(new_title) = repaired_title(&step.title, task.order_index, step.order_index) {
                        repairs.push(TitleRepair {
                            module_id,
                            step_id: step.id,
                            old_title: step.title,
                            new_title,
                        });
                    }
                }
            }
        }

        if apply {
            for repair in &repairs {
                let step = tx
                    .get_step(&repair.step_id)
                    .await?
                    .ok_or_else(|| AuthoringError::not_found("step", repair.step_id))?;
                tx.set_step_position(&step.id, step.order_index, &repair.new_title).await?;
            }
            tx.commit().await?;
        }

        tracing::info!(repairs = repairs.len(), apply, "Title repair scan complete");
        Ok(repairs)
    }
}

async fn load_task<T: StoreTx>(tx: &mut T, task_id: &TaskId) -> AuthoringResult<Task> {
    tx.get_task(task_id)
        .await?
        .ok_or_else(|| AuthoringError::not_found("task", task_id))
}

async fn load_module_exists<T: StoreTx>(tx: &mut T, module_id: &ModuleId) -> AuthoringResult<ModuleId> {
    tx.get_module(module_id)
        .await?
        .map(|m| m.id)
        .ok_or_else(|| AuthoringError::not_found("module", module_id))
}

/// Resolve a requested insert position to a concrete index.
async fn insertion_index<Sc: SiblingScope, T: StoreTx>(
    scope: &Sc,
    tx: &mut T,
    position: Option<u32>,
) -> AuthoringResult<u32> {
    let next = renumber::next_index(scope, tx).await?;
    match position {
        None => Ok(next),
        Some(0) => Err(AuthoringError::validation("position must be 1 or greater")),
        Some(p) => Ok(p.min(next)),
    }
}

/// Check that `given` lists every id of `existing` exactly once.
fn ensure_permutation<I>(entity: &str, given: &[I], existing: impl Iterator<Item = I>) -> AuthoringResult<()>
where
    I: Copy + Eq + Hash + std::fmt::Display,
{
    let existing: HashSet<I> = existing.collect();
    let mut seen: HashSet<I> = HashSet::with_capacity(given.len());

    for id in given {
        if !existing.contains(id) {
            return Err(AuthoringError::validation(format!("{} {} does not belong to this module", entity, id)));
        }
        if !seen.insert(*id) {
            return Err(AuthoringError::validation(format!("{} {} listed more than once", entity, id)));
        }
    }
    if seen.len() != existing.len() {
        return Err(AuthoringError::validation(format!(
            "expected {} {} ids, got {}",
            existing.len(),
            entity,
            given.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::Module;

    async fn setup() -> (OrderingEngine<InMemoryStore>, Module) {
        let store = Arc::new(InMemoryStore::new());
        let module = Module::new("PUMP", "Pump maintenance");
        let mut tx = store.begin().await.unwrap();
        tx.insert_module(&module).await.unwrap();
        tx.commit().await.unwrap();
        (OrderingEngine::new(store), module)
    }

    async fn titles(engine: &OrderingEngine<InMemoryStore>, task: &TaskId) -> Vec<(u32, String)> {
        let mut tx = engine.store().begin().await.unwrap();
        tx.list_task_steps(task)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.order_index, s.title))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_step_appends_with_generated_title() {
        let (engine, module) = setup().await;
        let task = engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();

        engine.insert_step(&task.id, None, None).await.unwrap();
        engine.insert_step(&task.id, None, Some("  ")).await.unwrap();

        assert_eq!(
            titles(&engine, &task.id).await,
            vec![(1, "Step 1.1".to_string()), (2, "Step 1.2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_position_zero_is_rejected() {
        let (engine, module) = setup().await;
        let task = engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();

        let err = engine.insert_step(&task.id, Some(0), None).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));
    }

    #[tokio::test]
    async fn test_position_past_end_appends() {
        let (engine, module) = setup().await;
        let task = engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
        engine.insert_step(&task.id, None, None).await.unwrap();

        let step = engine.insert_step(&task.id, Some(9), None).await.unwrap();
        assert_eq!(step.order_index, 2);
        assert_eq!(step.title, "Step 1.2");
    }

    #[tokio::test]
    async fn test_duplicate_taskless_step_fails() {
        let (engine, module) = setup().await;
        let orphan = Step::new(module.id, None, 1, "Loose");
        {
            let mut tx = engine.store().begin().await.unwrap();
            tx.insert_step(&orphan).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = engine.duplicate_step(&orphan.id).await.unwrap_err();
        assert!(matches!(err, AuthoringError::PreconditionFailed(_)));

        // Deleting it needs no renumbering.
        engine.delete_step(&orphan.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_reorder_rejects_partial_list() {
        let (engine, module) = setup().await;
        let task = engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
        let a = engine.insert_step(&task.id, None, None).await.unwrap();
        let b = engine.insert_step(&task.id, None, None).await.unwrap();

        let err = engine.reorder_steps(&module.id, &[b.id]).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));

        let err = engine.reorder_steps(&module.id, &[a.id, a.id]).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));

        let err = engine
            .reorder_steps(&module.id, &[a.id, b.id, StepId::generate()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reorder_steps_rewrites_generated_titles() {
        let (engine, module) = setup().await;
        let task = engine.insert_task(&module.id, None, "Prepare", None).await.unwrap();
        let a = engine.insert_step(&task.id, None, None).await.unwrap();
        let b = engine.insert_step(&task.id, None, Some("Open valve")).await.unwrap();
        let c = engine.insert_step(&task.id, None, Some("step 3")).await.unwrap();

        engine.reorder_steps(&module.id, &[c.id, a.id, b.id]).await.unwrap();

        assert_eq!(
            titles(&engine, &task.id).await,
            vec![
                (1, "Step 1.1".to_string()),
                (2, "Step 1.2".to_string()),
                (3, "Open valve".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reorder_tasks_keeps_step_titles() {
        let (engine, module) = setup().await;
        let first = engine.insert_task(&module.id, None, "First", None).await.unwrap();
        let second = engine.insert_task(&module.id, None, "Second", None).await.unwrap();
        engine.insert_step(&first.id, None, None).await.unwrap();

        engine.reorder_tasks(&module.id, &[second.id, first.id]).await.unwrap();

        let mut tx = engine.store().begin().await.unwrap();
        let tasks = tx.list_tasks(&module.id).await.unwrap();
        assert_eq!(tasks[0].id, second.id);
        assert_eq!(tasks[1].id, first.id);
        drop(tx);
        assert_eq!(titles(&engine, &first.id).await, vec![(1, "Step 1.1".to_string())]);

        let repairs = engine.repair_titles(Some(&module.id), false).await.unwrap();
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].new_title, "Step 2.1");
        // Dry run leaves the title alone.
        assert_eq!(titles(&engine, &first.id).await, vec![(1, "Step 1.1".to_string())]);

        engine.repair_titles(None, true).await.unwrap();
        assert_eq!(titles(&engine, &first.id).await, vec![(1, "Step 2.1".to_string())]);
    }

    #[tokio::test]
    async fn test_insert_task_cascades_step_titles() {
        let (engine, module) = setup().await;
        let first = engine.insert_task(&module.id, None, "First", None).await.unwrap();
        engine.insert_step(&first.id, None, None).await.unwrap();
        engine.insert_step(&first.id, None, Some("Step 7.1")).await.unwrap();

        let intro = engine.insert_task(&module.id, Some(1), "Intro", None).await.unwrap();
        assert_eq!(intro.order_index, 1);

        assert_eq!(
            titles(&engine, &first.id).await,
            vec![(1, "Step 2.1".to_string()), (2, "Step 7.1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_entities() {
        let (engine, _) = setup().await;
        assert!(matches!(
            engine.delete_step(&StepId::generate()).await,
            Err(AuthoringError::NotFound { entity: "step", .. })
        ));
        assert!(matches!(
            engine.insert_step(&TaskId::generate(), None, None).await,
            Err(AuthoringError::NotFound { entity: "task", .. })
        ));
        assert!(matches!(
            engine.reorder_tasks(&ModuleId::generate(), &[]).await,
            Err(AuthoringError::NotFound { entity: "module", .. })
        ));
    }
}
