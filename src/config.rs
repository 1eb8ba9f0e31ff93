//! Service configuration.
//!
//! All settings can be configured via environment variables:
//! - `ASSET_MAX_UPLOAD_BYTES`: Upload size limit (default: 104857600 = 100 MiB)
//! - `MEDIA_URL`: Prefix for blob URLs (default: `/media/`)
//! - `CATALOG_BASE_PATH`: Prefix for catalog `jsonPath` values (default: `/api/unity/modules`)
//! - `DETAIL_SOURCE`: `snapshot` or `live` (default: `snapshot`)

use crate::types::AssetType;

/// Default upload size limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Where module detail documents are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailSource {
    /// Latest published snapshot.
    #[default]
    Snapshot,
    /// Projection of the current store state.
    Live,
}

impl DetailSource {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Some(Self::Snapshot),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Live => "live",
        }
    }
}

/// Authoring configuration.
#[derive(Debug, Clone)]
pub struct AuthoringConfig {
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Prefix for blob URLs.
    pub media_url: String,
    /// Prefix for catalog `jsonPath` values, without trailing slash.
    pub catalog_base_path: String,
    /// Where detail documents come from.
    pub detail_source: DetailSource,
}

impl AuthoringConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_upload_bytes: std::env::var("ASSET_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            media_url: std::env::var("MEDIA_URL").unwrap_or(defaults.media_url),
            catalog_base_path: std::env::var("CATALOG_BASE_PATH")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.catalog_base_path),
            detail_source: std::env::var("DETAIL_SOURCE")
                .ok()
                .and_then(|s| DetailSource::from_str(&s))
                .unwrap_or(defaults.detail_source),
        }
    }

    /// Builder: set detail source.
    pub fn with_detail_source(mut self, source: DetailSource) -> Self {
        self.detail_source = source;
        self
    }

    /// Builder: set upload limit.
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Path under which a module's detail document is served.
    pub fn json_path(&self, code: &str) -> String {
        format!("{}/{}/", self.catalog_base_path, code)
    }
}

impl Default for AuthoringConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            media_url: "/media/".to_string(),
            catalog_base_path: "/api/unity/modules".to_string(),
            detail_source: DetailSource::Snapshot,
        }
    }
}

/// Accepted file extensions for an asset type. `None` means any extension.
pub fn allowed_extensions(asset_type: AssetType) -> Option<&'static [&'static str]> {
    match asset_type {
        AssetType::Image => Some(&[".png", ".jpg", ".jpeg", ".gif", ".webp"]),
        AssetType::Audio => Some(&[".mp3", ".wav", ".ogg"]),
        AssetType::Video => Some(&[".mp4", ".webm", ".ogg"]),
        AssetType::Gltf => Some(&[".gltf", ".glb"]),
        AssetType::Model => Some(&[".gltf", ".glb", ".fbx", ".obj"]),
        AssetType::Other => None,
    }
}
