//! Runtime wire documents.
//!
//! These structs are the bit-exact JSON contract consumed by the XR runtime.
//! Field presence matters:
//!
//! - `media`, `interactions`, `completionCriteria` serialize as `null` when absent
//! - `models` is always a list, possibly empty
//! - `choices` is omitted entirely for non-question steps without choices, and
//!   serializes as `null` for a question step that has none

use serde::{Deserialize, Deserializer, Serialize};

/// Catalog of published modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// One entry per published module.
    pub modules: Vec<CatalogEntry>,
}

/// Catalog entry for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// `moduleId`: external module code.
    pub module_id: String,
    /// Display title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Content version label.
    pub version: String,
    /// `VR` or `AR`.
    pub mode: String,
    /// `estimatedDurationMin`: expected run time in minutes.
    pub estimated_duration_min: u32,
    /// Content language code.
    pub language: String,
    /// `taskCount`: tasks currently in the module.
    pub task_count: usize,
    /// `stepCount`: steps that belong to a task.
    pub step_count: usize,
    /// Icon name for the launcher.
    pub icon: String,
    /// `jsonPath`: where the detail document is served.
    pub json_path: String,
    /// Thumbnail URL, `""` when unset.
    pub thumbnail: String,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// Full training document for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDocument {
    /// `moduleId`: external module code.
    pub module_id: String,
    /// Display title.
    pub title: String,
    /// Content version label.
    pub version: String,
    /// `VR` or `AR`.
    pub mode: String,
    /// `estimatedDurationMin`: expected run time in minutes.
    pub estimated_duration_min: u32,
    /// Content language code.
    pub language: String,
    /// Tasks in order.
    pub tasks: Vec<TaskDocument>,
}

impl ModuleDocument {
    /// Number of tasks in the document.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of steps across all tasks.
    pub fn step_count(&self) -> usize {
        self.tasks.iter().map(|t| t.steps.len()).sum()
    }

    /// Iterate every step in global order.
    pub fn steps(&self) -> impl Iterator<Item = &StepDocument> {
        self.tasks.iter().flat_map(|t| t.steps.iter())
    }
}

/// One task in the training document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    /// The task's position (1-based).
    pub task_id: u32,
    /// `"Task {n}: {title}"`.
    pub task_title: String,
    /// Steps in order.
    pub steps: Vec<StepDocument>,
}

/// One step in the training document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    /// Global sequential id, unique across the module.
    pub step_id: u32,
    /// Step title as authored.
    pub title: String,
    /// Instruction text.
    pub description: String,
    /// `instructionType`: how the runtime presents the step.
    pub instruction_type: String,
    /// 2D media, `null` when unset.
    pub media: Option<MediaDocument>,
    /// 3D placements, possibly empty.
    pub models: Vec<ModelDocument>,
    /// Required interaction, `null` without a required action.
    pub interactions: Option<InteractionDocument>,
    /// `completionCriteria`: `null` without a completion type.
    pub completion_criteria: Option<CompletionDocument>,
    /// Outer `None`: omitted. `Some(None)`: explicit `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub choices: Option<Option<Vec<ChoiceDocument>>>,
}

/// 2D media block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDocument {
    /// `type`: `image` or `video`.
    #[serde(rename = "type")]
    pub media_type: String,
    /// Resolved asset URL.
    pub path: String,
}

/// 3D model placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    /// Resolved asset URL.
    pub path: String,
    /// Animation clip name, `""` for none.
    pub animation: String,
    /// `animationLoop`: loop the clip.
    pub animation_loop: bool,
    /// Spawn transform.
    pub spawn: SpawnDocument,
}

/// Spawn transform of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDocument {
    /// World position `[x, y, z]`.
    pub position: [f64; 3],
    /// Euler rotation `[x, y, z]`.
    pub rotation: [f64; 3],
    /// Uniform scale.
    pub scale: f64,
}

/// Interaction requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDocument {
    /// `requiredAction`: action the trainee must perform.
    pub required_action: String,
    /// `inputMethod`: `null` when unset.
    pub input_method: Option<String>,
    /// Scene object the action applies to.
    pub target: Option<String>,
    /// Which hand, if constrained.
    pub hand: Option<String>,
    /// `attemptsAllowed`: 0 means unlimited.
    pub attempts_allowed: i32,
}

/// Completion criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDocument {
    /// `type`: completion criterion kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Criterion parameter.
    pub value: String,
}

/// Branch target resolved to a global step id (0 = unresolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceDocument {
    /// Button label.
    pub label: String,
    /// `goToStepId`: global id of the target step.
    pub go_to_step_id: u32,
}

/// Distinguish a present `null` from an absent field.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
