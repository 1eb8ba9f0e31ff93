//! Immutable published snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::ModuleDocument;
use super::ids::{ModuleId, SnapshotId};
use crate::canonical::canonical_hash_hex;

/// A frozen, versioned projection of one module.
///
/// Created only by publish; never mutated afterwards. `(module_id, version)`
/// is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    /// Row identity.
    pub id: SnapshotId,
    /// Module this snapshot belongs to.
    pub module_id: ModuleId,
    /// Per-module version, starting at 1.
    pub version: u32,
    /// Payload schema tag.
    pub schema_version: u32,
    /// The serialized module document.
    pub payload: serde_json::Value,
    /// xxh64 fingerprint of the canonical payload bytes.
    pub content_hash: String,
    /// Publish time.
    pub published_at: DateTime<Utc>,
}

impl PublishedSnapshot {
    /// Freeze a projected document as the given version.
    pub fn freeze(
        module_id: ModuleId,
        version: u32,
        schema_version: u32,
        document: &ModuleDocument,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(document)?;
        let content_hash = canonical_hash_hex(&payload);
        Ok(Self {
            id: SnapshotId::generate(),
            module_id,
            version,
            schema_version,
            payload,
            content_hash,
            published_at: Utc::now(),
        })
    }

    /// Parse the payload back into a typed document.
    pub fn document(&self) -> Result<ModuleDocument, serde_json::Error> {
        ModuleDocument::deserialize(&self.payload)
    }

    /// Check the payload still matches its fingerprint.
    pub fn verify(&self) -> bool {
        canonical_hash_hex(&self.payload) == self.content_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> ModuleDocument {
        ModuleDocument {
            module_id: "PUMP".to_string(),
            title: "Pump".to_string(),
            version: "1.0".to_string(),
            mode: "VR".to_string(),
            estimated_duration_min: 5,
            language: "en".to_string(),
            tasks: vec![],
        }
    }

    #[test]
    fn test_freeze_and_reparse() {
        let snapshot = PublishedSnapshot::freeze(ModuleId::generate(), 1, 1, &document()).unwrap();
        assert!(snapshot.verify());
        assert_eq!(snapshot.document().unwrap(), document());
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let mut snapshot = PublishedSnapshot::freeze(ModuleId::generate(), 1, 1, &document()).unwrap();
        snapshot.payload["title"] = serde_json::json!("Changed");
        assert!(!snapshot.verify());
    }
}
