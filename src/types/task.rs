//! Task entity: an ordered group of steps within a module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ModuleId, TaskId};

/// A task within a module.
///
/// `order_index` is 1-based and dense within the owning module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identity.
    pub id: TaskId,
    /// Owning module.
    pub module_id: ModuleId,
    /// Position within the module (1..=N).
    pub order_index: u32,
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a task at the given position.
    pub fn new(module_id: ModuleId, order_index: u32, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            module_id,
            order_index,
            title: title.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title shown to the runtime client.
    pub fn display_title(&self) -> String {
        format!("Task {}: {}", self.order_index, self.title)
    }
}
