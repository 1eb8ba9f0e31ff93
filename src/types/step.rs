//! Step entity and its embedded value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AssetId, ModuleId, StepId, TaskId};

/// Kind of instruction a step carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    /// Informational content.
    Info,
    /// Safety notice.
    Safety,
    /// Observe a demonstration.
    Observe,
    /// Perform an action.
    Action,
    /// Inspect an object.
    Inspect,
    /// Completion screen.
    Completion,
    /// Branching question with choices.
    Question,
}

impl InstructionType {
    /// Parse instruction type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "safety" => Some(Self::Safety),
            "observe" => Some(Self::Observe),
            "action" => Some(Self::Action),
            "inspect" => Some(Self::Inspect),
            "completion" => Some(Self::Completion),
            "question" => Some(Self::Question),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Safety => "safety",
            Self::Observe => "observe",
            Self::Action => "action",
            Self::Inspect => "inspect",
            Self::Completion => "completion",
            Self::Question => "question",
        }
    }
}

impl Default for InstructionType {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for InstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media kind for a step's 2D media block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

impl MediaType {
    /// Parse media type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::Image
    }
}

/// Which hand an interaction expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    /// Left hand.
    Left,
    /// Right hand.
    Right,
}

impl Hand {
    /// Parse hand from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// How the runtime decides a step is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionType {
    /// A UI button was clicked.
    ButtonClicked,
    /// A model animation finished.
    AnimationCompleted,
    /// The interaction was performed.
    InteractionCompleted,
    /// A minimum time elapsed.
    TimeSpent,
    /// The user confirmed explicitly.
    UserConfirmed,
}

impl CompletionType {
    /// Parse completion type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "button_clicked" => Some(Self::ButtonClicked),
            "animation_completed" => Some(Self::AnimationCompleted),
            "interaction_completed" => Some(Self::InteractionCompleted),
            "time_spent" => Some(Self::TimeSpent),
            "user_confirmed" => Some(Self::UserConfirmed),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ButtonClicked => "button_clicked",
            Self::AnimationCompleted => "animation_completed",
            Self::InteractionCompleted => "interaction_completed",
            Self::TimeSpent => "time_spent",
            Self::UserConfirmed => "user_confirmed",
        }
    }
}

/// One placement of a 3D model in the scene for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPlacement {
    /// Model asset. `None` once the asset has been deleted.
    pub asset: Option<AssetId>,
    /// Animation clip name (empty for none).
    pub animation: String,
    /// Whether the animation loops.
    pub animation_loop: bool,
    /// Spawn position (x, y, z).
    pub position: [f64; 3],
    /// Spawn rotation in degrees (x, y, z).
    pub rotation: [f64; 3],
    /// Uniform scale.
    pub scale: f64,
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self {
            asset: None,
            animation: String::new(),
            animation_loop: false,
            position: [0.0, 0.0, 2.0],
            rotation: [0.0, 180.0, 0.0],
            scale: 1.0,
        }
    }
}

impl ModelPlacement {
    /// Placement of an asset at the default spawn transform.
    pub fn of(asset: AssetId) -> Self {
        Self {
            asset: Some(asset),
            ..Self::default()
        }
    }
}

/// Interaction requirement for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Action the trainee must perform. Never empty.
    pub required_action: String,
    /// Input method (controller, hand tracking, ...).
    pub input_method: Option<String>,
    /// Target object name.
    pub target: Option<String>,
    /// Expected hand.
    pub hand: Option<Hand>,
    /// Attempts allowed (0 = unlimited).
    pub attempts_allowed: i32,
}

/// Completion criterion for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCriterion {
    /// Criterion kind.
    pub kind: CompletionType,
    /// Kind-specific value (seconds, button id, ...).
    pub value: String,
}

/// A single instructional step.
///
/// `order_index` is 1-based and dense within `task_id`. A step without a task
/// is an orphan: it is kept by its module but never renumbered or projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step identity.
    pub id: StepId,
    /// Owning module (denormalized).
    pub module_id: ModuleId,
    /// Owning task, if any.
    pub task_id: Option<TaskId>,
    /// Position within the task (1..=N).
    pub order_index: u32,
    /// Title; auto-generated or custom.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Instruction kind.
    pub instruction_type: InstructionType,
    /// Media kind, meaningful only with `media_asset`.
    pub media_type: Option<MediaType>,
    /// Attached 2D media asset.
    pub media_asset: Option<AssetId>,
    /// 3D model placements (canonical representation).
    pub models: Vec<ModelPlacement>,
    /// Legacy single-model placement, read only as a fallback when `models`
    /// is empty. Never written by this crate.
    pub legacy_model: Option<ModelPlacement>,
    /// Interaction requirement.
    pub interaction: Option<Interaction>,
    /// Completion criterion.
    pub completion: Option<CompletionCriterion>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// Create an info step with empty content.
    pub fn new(
        module_id: ModuleId,
        task_id: Option<TaskId>,
        order_index: u32,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::generate(),
            module_id,
            task_id,
            order_index,
            title: title.into(),
            description: String::new(),
            instruction_type: InstructionType::Info,
            media_type: None,
            media_asset: None,
            models: Vec::new(),
            legacy_model: None,
            interaction: None,
            completion: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placements to present: the list, or the legacy single placement when
    /// the list is empty.
    pub fn effective_models(&self) -> Vec<ModelPlacement> {
        if !self.models.is_empty() {
            return self.models.clone();
        }
        self.legacy_model.iter().cloned().collect()
    }

    /// Copy every content field into a new row with a fresh identity.
    ///
    /// Legacy placement data is folded into `models` on the copy.
    pub fn duplicate_content(&self, order_index: u32, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::generate(),
            module_id: self.module_id,
            task_id: self.task_id,
            order_index,
            title,
            description: self.description.clone(),
            instruction_type: self.instruction_type,
            media_type: self.media_type,
            media_asset: self.media_asset,
            models: self.effective_models(),
            legacy_model: None,
            interaction: self.interaction.clone(),
            completion: self.completion.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop every reference to an asset.
    ///
    /// Returns true if anything changed.
    pub fn clear_asset(&mut self, asset: AssetId) -> bool {
        let mut changed = false;
        if self.media_asset == Some(asset) {
            self.media_asset = None;
            changed = true;
        }
        for placement in self.models.iter_mut().chain(self.legacy_model.iter_mut()) {
            if placement.asset == Some(asset) {
                placement.asset = None;
                changed = true;
            }
        }
        changed
    }
}
