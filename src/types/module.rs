//! Training module entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AssetId, ModuleId};

/// Maximum length of an auto-generated module code base.
pub const MODULE_CODE_BASE_MAX: usize = 30;

/// Fallback code base when a title yields no usable characters.
pub const MODULE_CODE_FALLBACK: &str = "MODULE";

/// Lifecycle status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Being authored; hidden from the catalog.
    Draft,
    /// Visible in the runtime catalog.
    Published,
}

impl ModuleStatus {
    /// Parse status from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl Default for ModuleStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation mode of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Virtual reality.
    #[serde(rename = "VR")]
    Vr,
    /// Augmented reality.
    #[serde(rename = "AR")]
    Ar,
}

impl Mode {
    /// Parse mode from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "VR" => Some(Self::Vr),
            "AR" => Some(Self::Ar),
            _ => None,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vr => "VR",
            Self::Ar => "AR",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Vr
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A training module: the top-level publishable unit.
///
/// The external `code` is the identifier the runtime client sees. It is
/// assigned once at creation and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Internal identity.
    pub id: ModuleId,
    /// External human-readable code (e.g. `PUMP_MAINTENANCE_001`).
    pub code: String,
    /// Display title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Content version label shown to the runtime (e.g. "1.0").
    pub version: String,
    /// VR or AR.
    pub mode: Mode,
    /// Estimated duration in minutes.
    pub estimated_duration_min: u32,
    /// Language code.
    pub language: String,
    /// Short icon token.
    pub icon: String,
    /// Optional thumbnail asset.
    pub thumbnail: Option<AssetId>,
    /// Catalog tags.
    pub tags: Vec<String>,
    /// Lifecycle status.
    pub status: ModuleStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Module {
    /// Create a draft module with default display metadata.
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ModuleId::generate(),
            code: code.into(),
            title: title.into(),
            description: String::new(),
            version: "1.0".to_string(),
            mode: Mode::default(),
            estimated_duration_min: 0,
            language: "en".to_string(),
            icon: String::new(),
            thumbnail: None,
            tags: Vec::new(),
            status: ModuleStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the module appears in the runtime catalog.
    pub fn is_published(&self) -> bool {
        self.status == ModuleStatus::Published
    }
}

/// Derive the base of an external module code from a title.
///
/// Lower-cases, keeps ASCII alphanumerics and underscores, collapses runs of
/// whitespace and hyphens into a single separator, then upper-cases with `_`
/// separators and truncates to [`MODULE_CODE_BASE_MAX`] characters.
pub fn code_base_from_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_sep = false;

    for ch in title.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_uppercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_sep = true;
        }
    }

    let trimmed = slug.trim_matches('_');
    let base: String = trimmed.chars().take(MODULE_CODE_BASE_MAX).collect();
    if base.is_empty() {
        MODULE_CODE_FALLBACK.to_string()
    } else {
        base
    }
}

/// Candidate code for the n-th collision (`n == 0` is the bare base).
pub fn code_candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}_{:03}", base, n)
    }
}
