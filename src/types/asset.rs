//! Asset records. The bytes live in the blob store; this is the metadata row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::AssetId;

/// Declared type of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Raster image.
    Image,
    /// Audio clip.
    Audio,
    /// Video clip.
    Video,
    /// glTF scene.
    Gltf,
    /// Generic 3D model.
    Model,
    /// Anything else.
    Other,
}

impl AssetType {
    /// All asset types, in declaration order.
    pub const ALL: [AssetType; 6] = [
        Self::Image,
        Self::Audio,
        Self::Video,
        Self::Gltf,
        Self::Model,
        Self::Other,
    ];

    /// Parse asset type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "gltf" => Some(Self::Gltf),
            "model" => Some(Self::Model),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Gltf => "gltf",
            Self::Model => "model",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for an uploaded binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset identity; also the blob key.
    pub id: AssetId,
    /// Filename as uploaded.
    pub original_filename: String,
    /// Declared type.
    pub asset_type: AssetType,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Free-form metadata (bounds, frame counts, ...).
    pub metadata: Option<serde_json::Value>,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Lower-cased extension of the original filename, including the dot.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.original_filename)
    }
}

/// Lower-cased extension of a filename, including the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos..].to_lowercase()),
        _ => None,
    }
}
