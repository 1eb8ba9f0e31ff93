//! Projection from the relational authoring model to the runtime document.
//!
//! Projection is a pure function of a loaded [`ModuleGraph`] and an asset URL
//! resolver. Global step ids are recomputed on every run: a counter from 1
//! walks tasks in order and, inside each task, steps in order. Steps without a
//! task are not part of the document.

use std::collections::HashMap;

use crate::blob::BlobStore;
use crate::store::{StoreError, StoreTx};
use crate::types::{
    Choice, ChoiceDocument, CompletionDocument, InstructionType, InteractionDocument, MediaDocument,
    MediaType, ModelDocument, Module, ModuleDocument, SpawnDocument, Step, StepDocument, StepId, Task,
    TaskDocument,
};

/// A step with its choices.
#[derive(Debug, Clone)]
pub struct StepNode {
    /// The step row.
    pub step: Step,
    /// Choices ordered by `order_index`.
    pub choices: Vec<Choice>,
}

/// A task with its steps.
#[derive(Debug, Clone)]
pub struct TaskNode {
    /// The task row.
    pub task: Task,
    /// Steps ordered by `order_index`.
    pub steps: Vec<StepNode>,
}

/// One module loaded for projection.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    /// The module row.
    pub module: Module,
    /// Tasks ordered by `order_index`.
    pub tasks: Vec<TaskNode>,
}

impl ModuleGraph {
    /// Load a module's tasks, steps and choices inside a transaction.
    pub async fn load<T: StoreTx>(tx: &mut T, module: Module) -> Result<Self, StoreError> {
        let mut tasks = Vec::new();
        for task in tx.list_tasks(&module.id).await? {
            let mut steps = Vec::new();
            for step in tx.list_task_steps(&task.id).await? {
                let choices = tx.list_choices(&step.id).await?;
                steps.push(StepNode { step, choices });
            }
            tasks.push(TaskNode { task, steps });
        }
        Ok(Self { module, tasks })
    }

    /// Number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of steps across all tasks.
    pub fn step_count(&self) -> usize {
        self.tasks.iter().map(|t| t.steps.len()).sum()
    }

    /// Steps in document order.
    pub fn steps(&self) -> impl Iterator<Item = &StepNode> {
        self.tasks.iter().flat_map(|t| t.steps.iter())
    }
}

/// Global sequential ids for every step of the graph, starting at 1.
pub fn global_step_ids(graph: &ModuleGraph) -> HashMap<StepId, u32> {
    graph
        .steps()
        .zip(1u32..)
        .map(|(node, id)| (node.step.id, id))
        .collect()
}

/// Project a module graph into its runtime document.
pub fn project_module<B: BlobStore + ?Sized>(graph: &ModuleGraph, blobs: &B) -> ModuleDocument {
    let ids = global_step_ids(graph);
    let module = &graph.module;

    let tasks = graph
        .tasks
        .iter()
        .map(|node| TaskDocument {
            task_id: node.task.order_index,
            task_title: node.task.display_title(),
            steps: node
                .steps
                .iter()
                .map(|s| project_step(s, &ids, blobs))
                .collect(),
        })
        .collect();

    ModuleDocument {
        module_id: module.code.clone(),
        title: module.title.clone(),
        version: module.version.clone(),
        mode: module.mode.as_str().to_string(),
        estimated_duration_min: module.estimated_duration_min,
        language: module.language.clone(),
        tasks,
    }
}

fn project_step<B: BlobStore + ?Sized>(node: &StepNode, ids: &HashMap<StepId, u32>, blobs: &B) -> StepDocument {
    let step = &node.step;

    let media = step.media_asset.map(|asset| MediaDocument {
        media_type: step.media_type.unwrap_or(MediaType::Image).as_str().to_string(),
        path: blobs.url_of(&asset),
    });

    let models = step
        .effective_models()
        .into_iter()
        .filter_map(|placement| {
            let asset = placement.asset?;
            Some(ModelDocument {
                path: blobs.url_of(&asset),
                animation: placement.animation,
                animation_loop: placement.animation_loop,
                spawn: SpawnDocument {
                    position: placement.position,
                    rotation: placement.rotation,
                    scale: placement.scale,
                },
            })
        })
        .collect();

    let interactions = step
        .interaction
        .as_ref()
        .filter(|i| !i.required_action.is_empty())
        .map(|i| InteractionDocument {
            required_action: i.required_action.clone(),
            input_method: i.input_method.clone().filter(|s| !s.is_empty()),
            target: i.target.clone().filter(|s| !s.is_empty()),
            hand: i.hand.map(|h| h.as_str().to_string()),
            attempts_allowed: i.attempts_allowed,
        });

    let completion_criteria = step.completion.as_ref().map(|c| CompletionDocument {
        kind: c.kind.as_str().to_string(),
        value: c.value.clone(),
    });

    let choices = if step.instruction_type == InstructionType::Question || !node.choices.is_empty() {
        if node.choices.is_empty() {
            Some(None)
        } else {
            Some(Some(
                node.choices
                    .iter()
                    .map(|c| ChoiceDocument {
                        label: c.label.clone(),
                        go_to_step_id: c.target.and_then(|t| ids.get(&t).copied()).unwrap_or(0),
                    })
                    .collect(),
            ))
        }
    } else {
        None
    };

    StepDocument {
        step_id: ids.get(&step.id).copied().unwrap_or(0),
        title: step.title.clone(),
        description: step.description.clone(),
        instruction_type: step.instruction_type.as_str().to_string(),
        media,
        models,
        interactions,
        completion_criteria,
        choices,
    }
}
