//! Core entity and wire types for the authoring model.

pub mod ids;
pub mod module;
pub mod task;
pub mod step;
pub mod choice;
pub mod asset;
pub mod snapshot;
pub mod document;

pub use ids::{AssetId, ChoiceId, ModuleId, SnapshotId, StepId, TaskId};
pub use module::{Module, ModuleStatus, Mode, code_base_from_title, code_candidate};
pub use task::Task;
pub use step::{
    CompletionCriterion, CompletionType, Hand, InstructionType, Interaction,
    MediaType, ModelPlacement, Step,
};
pub use choice::{Choice, ChoiceInput};
pub use asset::{Asset, AssetType, file_extension};
pub use snapshot::PublishedSnapshot;
pub use document::{
    CatalogDocument, CatalogEntry, ChoiceDocument, CompletionDocument,
    InteractionDocument, MediaDocument, ModelDocument, ModuleDocument,
    SpawnDocument, StepDocument, TaskDocument,
};
