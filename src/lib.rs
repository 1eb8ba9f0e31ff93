//! # training-authoring
//!
//! Authoring core for step-by-step VR/AR training modules.
//!
//! Authors build modules out of ordered tasks and steps. The runtime client
//! consumes a flat JSON document in which every step has a global sequential
//! id and branching choices point at those ids.
//!
//! ## Core Contract
//!
//! 1. Task and step positions are dense `1..N` within their parent after every
//!    operation, and each operation is atomic
//! 2. Generated titles (`"Step 2.3"`) follow their step; custom titles never move
//! 3. Publishing freezes a projection as an immutable, versioned snapshot
//!
//! ## Architecture
//!
//! ```text
//! AuthoringService ─┐
//! OrderingEngine ───┼─→ AuthoringStore (Postgres or Memory) ─→ ModuleGraph
//! AssetLibrary ─────┘                                              ↓
//!                                             project_module → ModuleDocument
//!                                                                  ↓
//!                           Publisher (snapshots) / CatalogProjection (catalog)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same store state → identical module document
//! - Global step ids are recomputed per projection: tasks in order, then steps
//! - Snapshot payloads carry an xxh64 fingerprint of their canonical bytes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod title;
pub mod error;
pub mod config;
pub mod store;
pub mod blob;
pub mod ordering;
pub mod authoring;
pub mod projection;
pub mod publish;
pub mod catalog;
pub mod assets;
pub mod canonical;

// Re-exports
pub use types::{
    Asset, AssetId, AssetType, Choice, ChoiceId, ChoiceInput, CompletionCriterion, CompletionType,
    Hand, InstructionType, Interaction, MediaType, ModelPlacement, Mode, Module, ModuleId,
    ModuleStatus, PublishedSnapshot, SnapshotId, Step, StepId, Task, TaskId,
};
pub use types::{
    CatalogDocument, CatalogEntry, ChoiceDocument, CompletionDocument, InteractionDocument,
    MediaDocument, ModelDocument, ModuleDocument, SpawnDocument, StepDocument, TaskDocument,
};
pub use title::StepTitle;
pub use error::{AuthoringError, AuthoringResult};
pub use config::{AuthoringConfig, DetailSource};
pub use store::{AuthoringStore, InMemoryStore, StoreError, StoreTx};
#[cfg(feature = "postgres")]
pub use store::{PostgresAuthoringStore, PostgresConfig};
#[cfg(feature = "postgres")]
pub use store::postgres::AUTHORING_SCHEMA;
pub use blob::{BlobError, BlobStore, InMemoryBlobStore};
pub use ordering::{OrderingEngine, TitleRepair};
pub use authoring::{AuthoringService, ModuleDraft, StepContent};
pub use projection::{global_step_ids, project_module, ModuleGraph};
pub use publish::{Publisher, SNAPSHOT_SCHEMA_VERSION};
pub use catalog::CatalogProjection;
pub use assets::{AssetLibrary, AssetUpload};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
