//! Identifier newtypes for authoring entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a UUID string.
            pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

entity_id!(
    /// Internal identity of a training module.
    ModuleId
);
entity_id!(
    /// Identity of a task within a module.
    TaskId
);
entity_id!(
    /// Identity of a step. Distinct from the projection-time global step id.
    StepId
);
entity_id!(
    /// Identity of a branching choice.
    ChoiceId
);
entity_id!(
    /// Identity of an uploaded asset (also the blob store key).
    AssetId
);
entity_id!(
    /// Identity of a published snapshot row.
    SnapshotId
);
