//! Branching choice attached to a question step.

use serde::{Deserialize, Serialize};

use super::ids::{ChoiceId, StepId};

/// A labeled branch from a question step to a target step.
///
/// The target is nullable: a deleted target step leaves the choice dangling
/// rather than removing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice identity.
    pub id: ChoiceId,
    /// Owning (question) step.
    pub step_id: StepId,
    /// Button label.
    pub label: String,
    /// Step to jump to.
    pub target: Option<StepId>,
    /// Position within the owning step.
    pub order_index: u32,
}

impl Choice {
    /// Create a choice.
    pub fn new(step_id: StepId, label: impl Into<String>, target: Option<StepId>, order_index: u32) -> Self {
        Self {
            id: ChoiceId::generate(),
            step_id,
            label: label.into(),
            target,
            order_index,
        }
    }

    /// Copy onto another step with a fresh identity, keeping label, target
    /// and order.
    pub fn copy_to(&self, step_id: StepId) -> Self {
        Self::new(step_id, self.label.clone(), self.target, self.order_index)
    }
}

/// Author-supplied choice content (order is list position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceInput {
    /// Button label.
    pub label: String,
    /// Step to jump to.
    pub target: Option<StepId>,
}
