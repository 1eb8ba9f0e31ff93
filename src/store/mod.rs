//! Entity storage backends.
//!
//! Every read and write goes through a [`StoreTx`] obtained from
//! [`AuthoringStore::begin`]. A transaction that is dropped without
//! [`StoreTx::commit`] leaves no trace. Backends enforce the same uniqueness
//! constraints so that ordering bugs surface identically in tests and in
//! production:
//!
//! - `modules(code)`
//! - `tasks(module_id, order_index)`
//! - `steps(task_id, order_index)` for steps that have a task
//! - `snapshots(module_id, version)`

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::types::{
    Asset, AssetId, Choice, Module, ModuleId, ModuleStatus, PublishedSnapshot, Step, StepId,
    Task, TaskId,
};

/// Storage-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected a write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    /// The transaction could not be serialized against a concurrent one.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),
    /// A write referenced a row that does not exist.
    #[error("Referenced row missing: {0}")]
    MissingRow(String),
    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    /// Failure injected by a test harness.
    #[error("Injected failure: {0}")]
    Injected(String),
    /// Database driver error.
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Whether the failure is a transient constraint conflict.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_) | Self::SerializationFailure(_))
    }
}

/// A storage backend able to open transactions.
#[async_trait]
pub trait AuthoringStore: Send + Sync {
    /// Transaction type.
    type Tx: StoreTx;

    /// Open a serializable transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Operations available inside a transaction.
///
/// List methods return rows in deterministic order: tasks and steps by
/// `order_index`, choices by `order_index`, modules and assets newest first,
/// snapshots by descending version.
#[async_trait]
pub trait StoreTx: Send {
    // ── Modules ─────────────────────────────────────────────────────────

    /// Fetch a module by internal id.
    async fn get_module(&mut self, id: &ModuleId) -> Result<Option<Module>, StoreError>;

    /// Fetch a module by external code.
    async fn get_module_by_code(&mut self, code: &str) -> Result<Option<Module>, StoreError>;

    /// All modules, newest first.
    async fn list_modules(&mut self) -> Result<Vec<Module>, StoreError>;

    /// Modules with the given status, newest first.
    async fn list_modules_with_status(&mut self, status: ModuleStatus) -> Result<Vec<Module>, StoreError>;

    /// Insert a module.
    async fn insert_module(&mut self, module: &Module) -> Result<(), StoreError>;

    /// Overwrite a module row.
    async fn update_module(&mut self, module: &Module) -> Result<(), StoreError>;

    /// Delete a module with its tasks, steps and choices.
    async fn delete_module(&mut self, id: &ModuleId) -> Result<bool, StoreError>;

    // ── Tasks ───────────────────────────────────────────────────────────

    /// Fetch a task.
    async fn get_task(&mut self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Tasks of a module ordered by `order_index`.
    async fn list_tasks(&mut self, module_id: &ModuleId) -> Result<Vec<Task>, StoreError>;

    /// Insert a task.
    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError>;

    /// Overwrite a task's title and description.
    async fn update_task(&mut self, task: &Task) -> Result<(), StoreError>;

    /// Move a task to a new position.
    async fn set_task_order(&mut self, id: &TaskId, order_index: u32) -> Result<(), StoreError>;

    /// Delete a task with its steps and their choices.
    async fn delete_task(&mut self, id: &TaskId) -> Result<bool, StoreError>;

    // ── Steps ───────────────────────────────────────────────────────────

    /// Fetch a step.
    async fn get_step(&mut self, id: &StepId) -> Result<Option<Step>, StoreError>;

    /// Steps of a task ordered by `order_index`.
    async fn list_task_steps(&mut self, task_id: &TaskId) -> Result<Vec<Step>, StoreError>;

    /// Every step of a module, including task-less ones.
    async fn list_module_steps(&mut self, module_id: &ModuleId) -> Result<Vec<Step>, StoreError>;

    /// Insert a step.
    async fn insert_step(&mut self, step: &Step) -> Result<(), StoreError>;

    /// Overwrite a step's content fields. Position and task are untouched.
    async fn update_step(&mut self, step: &Step) -> Result<(), StoreError>;

    /// Move a step to a new position and set its title.
    async fn set_step_position(&mut self, id: &StepId, order_index: u32, title: &str) -> Result<(), StoreError>;

    /// Delete a step with its choices. Choices elsewhere that targeted it
    /// keep existing with no target.
    async fn delete_step(&mut self, id: &StepId) -> Result<bool, StoreError>;

    // ── Choices ─────────────────────────────────────────────────────────

    /// Choices of a step ordered by `order_index`.
    async fn list_choices(&mut self, step_id: &StepId) -> Result<Vec<Choice>, StoreError>;

    /// Insert a choice.
    async fn insert_choice(&mut self, choice: &Choice) -> Result<(), StoreError>;

    /// Delete every choice of a step.
    async fn delete_choices(&mut self, step_id: &StepId) -> Result<(), StoreError>;

    // ── Assets ──────────────────────────────────────────────────────────

    /// Fetch an asset record.
    async fn get_asset(&mut self, id: &AssetId) -> Result<Option<Asset>, StoreError>;

    /// All asset records, newest first.
    async fn list_assets(&mut self) -> Result<Vec<Asset>, StoreError>;

    /// Insert an asset record.
    async fn insert_asset(&mut self, asset: &Asset) -> Result<(), StoreError>;

    /// Delete an asset record, clearing every reference to it.
    async fn delete_asset(&mut self, id: &AssetId) -> Result<bool, StoreError>;

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Highest published version of a module.
    async fn latest_snapshot_version(&mut self, module_id: &ModuleId) -> Result<Option<u32>, StoreError>;

    /// Latest snapshot of a module.
    async fn latest_snapshot(&mut self, module_id: &ModuleId) -> Result<Option<PublishedSnapshot>, StoreError>;

    /// All snapshots of a module, newest version first.
    async fn list_snapshots(&mut self, module_id: &ModuleId) -> Result<Vec<PublishedSnapshot>, StoreError>;

    /// Insert a snapshot.
    async fn insert_snapshot(&mut self, snapshot: &PublishedSnapshot) -> Result<(), StoreError>;

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Make every write in this transaction durable.
    async fn commit(self) -> Result<(), StoreError>;
}

pub use memory::InMemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresAuthoringStore, PostgresConfig};
