//! Sibling renumbering shared by the step and task scopes.
//!
//! A scope is an ordered set of siblings with a dense 1-based index that is
//! unique within the scope. Every shift keeps the unique constraint satisfied
//! row by row: gaps are opened highest index first and closed lowest first,
//! and full reorders park every row above the current maximum before writing
//! final positions.

use async_trait::async_trait;
use std::cmp::Reverse;

use crate::store::{StoreError, StoreTx};
use crate::title::{repositioned_title, retasked_title, shifted_title};
use crate::types::{ModuleId, Step, Task};

/// An ordered set of siblings.
#[async_trait]
pub trait SiblingScope: Send + Sync {
    /// Row type.
    type Row: Send + Sync;

    /// Scope name for log events.
    fn label(&self) -> &'static str;

    /// Current index of a row.
    fn index_of(row: &Self::Row) -> u32;

    /// Load every sibling.
    async fn load<T: StoreTx>(&self, tx: &mut T) -> Result<Vec<Self::Row>, StoreError>;

    /// Move a row because a neighbour was inserted or removed.
    async fn shift<T: StoreTx>(&self, tx: &mut T, row: &Self::Row, new_index: u32) -> Result<(), StoreError>;

    /// Move a row to a temporary slot without touching anything else.
    async fn park<T: StoreTx>(&self, tx: &mut T, row: &Self::Row, slot: u32) -> Result<(), StoreError>;

    /// Move a row to an explicitly requested position.
    async fn place<T: StoreTx>(&self, tx: &mut T, row: &Self::Row, new_index: u32) -> Result<(), StoreError>;
}

/// Steps of one task.
pub struct StepScope<'a> {
    task: &'a Task,
}

impl<'a> StepScope<'a> {
    /// Scope over the steps of `task`.
    pub fn of(task: &'a Task) -> Self {
        Self { task }
    }
}

#[async_trait]
impl<'a> SiblingScope for StepScope<'a> {
    type Row = Step;

    fn label(&self) -> &'static str {
        "step"
    }

    fn index_of(row: &Step) -> u32 {
        row.order_index
    }

    async fn load<T: StoreTx>(&self, tx: &mut T) -> Result<Vec<Step>, StoreError> {
        tx.list_task_steps(&self.task.id).await
    }

    async fn shift<T: StoreTx>(&self, tx: &mut T, row: &Step, new_index: u32) -> Result<(), StoreError> {
        let title = shifted_title(&row.title, new_index).unwrap_or_else(|| row.title.clone());
        tracing::debug!(
            step_id = %row.id,
            from = row.order_index,
            to = new_index,
            title = %title,
            "Shifting step"
        );
        tx.set_step_position(&row.id, new_index, &title).await
    }

    async fn park<T: StoreTx>(&self, tx: &mut T, row: &Step, slot: u32) -> Result<(), StoreError> {
        tx.set_step_position(&row.id, slot, &row.title).await
    }

    async fn place<T: StoreTx>(&self, tx: &mut T, row: &Step, new_index: u32) -> Result<(), StoreError> {
        let title = repositioned_title(&row.title, self.task.order_index, new_index)
            .unwrap_or_else(|| row.title.clone());
        tracing::debug!(
            step_id = %row.id,
            from = row.order_index,
            to = new_index,
            title = %title,
            "Placing step"
        );
        tx.set_step_position(&row.id, new_index, &title).await
    }
}

/// Tasks of one module.
///
/// Shifting a task also rewrites the titles of its steps whose two-part
/// title embeds the task's old index. Explicit placement does not.
pub struct TaskScope {
    module_id: ModuleId,
}

impl TaskScope {
    /// Scope over the tasks of a module.
    pub fn of(module_id: ModuleId) -> Self {
        Self { module_id }
    }
}

#[async_trait]
impl SiblingScope for TaskScope {
    type Row = Task;

    fn label(&self) -> &'static str {
        "task"
    }

    fn index_of(row: &Task) -> u32 {
        row.order_index
    }

    async fn load<T: StoreTx>(&self, tx: &mut T) -> Result<Vec<Task>, StoreError> {
        tx.list_tasks(&self.module_id).await
    }

    async fn shift<T: StoreTx>(&self, tx: &mut T, row: &Task, new_index: u32) -> Result<(), StoreError> {
        tracing::debug!(task_id = %row.id, from = row.order_index, to = new_index, "Shifting task");
        tx.set_task_order(&row.id, new_index).await?;

        for step in tx.list_task_steps(&row.id).await? {
            if let Some(title) = retasked_title(&step.title, row.order_index, new_index) {
                tracing::debug!(step_id = %step.id, title = %title, "Retitling step of shifted task");
                tx.set_step_position(&step.id, step.order_index, &title).await?;
            }
        }
        Ok(())
    }

    async fn park<T: StoreTx>(&self, tx: &mut T, row: &Task, slot: u32) -> Result<(), StoreError> {
        tx.set_task_order(&row.id, slot).await
    }

    async fn place<T: StoreTx>(&self, tx: &mut T, row: &Task, new_index: u32) -> Result<(), StoreError> {
        tracing::debug!(task_id = %row.id, from = row.order_index, to = new_index, "Placing task");
        tx.set_task_order(&row.id, new_index).await
    }
}

/// Index one past the highest sibling (1 for an empty scope).
pub async fn next_index<S: SiblingScope, T: StoreTx>(scope: &S, tx: &mut T) -> Result<u32, StoreError> {
    let rows = scope.load(tx).await?;
    Ok(rows.iter().map(S::index_of).max().unwrap_or(0) + 1)
}

/// Shift every sibling at or after `position` up by one, highest first.
///
/// Returns the number of shifted rows.
pub async fn open_gap<S: SiblingScope, T: StoreTx>(scope: &S, tx: &mut T, position: u32) -> Result<usize, StoreError> {
    let mut rows: Vec<S::Row> = scope
        .load(tx)
        .await?
        .into_iter()
        .filter(|r| S::index_of(r) >= position)
        .collect();
    rows.sort_by_key(|r| Reverse(S::index_of(r)));

    for row in &rows {
        scope.shift(tx, row, S::index_of(row) + 1).await?;
    }
    if !rows.is_empty() {
        tracing::debug!(scope = scope.label(), position, shifted = rows.len(), "Opened gap");
    }
    Ok(rows.len())
}

/// Shift every sibling after `removed` down by one, lowest first.
///
/// Returns the number of shifted rows.
pub async fn close_gap<S: SiblingScope, T: StoreTx>(scope: &S, tx: &mut T, removed: u32) -> Result<usize, StoreError> {
    let mut rows: Vec<S::Row> = scope
        .load(tx)
        .await?
        .into_iter()
        .filter(|r| S::index_of(r) > removed)
        .collect();
    rows.sort_by_key(|r| S::index_of(r));

    for row in &rows {
        scope.shift(tx, row, S::index_of(row) - 1).await?;
    }
    if !rows.is_empty() {
        tracing::debug!(scope = scope.label(), removed, shifted = rows.len(), "Closed gap");
    }
    Ok(rows.len())
}

/// Give `ordered[i]` the index `i + 1`.
///
/// `ordered` must hold every sibling of the scope exactly once. Returns
/// `false` without writing anything if the order is already in place.
pub async fn reorder<S: SiblingScope, T: StoreTx>(scope: &S, tx: &mut T, ordered: &[S::Row]) -> Result<bool, StoreError> {
    let in_place = ordered
        .iter()
        .enumerate()
        .all(|(i, row)| S::index_of(row) as usize == i + 1);
    if in_place {
        return Ok(false);
    }

    let ceiling = ordered.iter().map(S::index_of).max().unwrap_or(0);
    for (i, row) in ordered.iter().enumerate() {
        scope.park(tx, row, ceiling + i as u32 + 1).await?;
    }
    for (i, row) in ordered.iter().enumerate() {
        scope.place(tx, row, i as u32 + 1).await?;
    }
    tracing::debug!(scope = scope.label(), rows = ordered.len(), "Reordered siblings");
    Ok(true)
}
