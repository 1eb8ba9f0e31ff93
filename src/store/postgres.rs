//! PostgreSQL entity store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Transactions
//!
//! Every transaction runs at `SERIALIZABLE`. Unique violations (`23505`) and
//! serialization failures (`40001`) surface as retryable constraint errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{AuthoringStore, StoreError, StoreTx};
use crate::types::{
    Asset, AssetId, AssetType, Choice, ChoiceId, CompletionCriterion, CompletionType, Hand,
    InstructionType, Interaction, MediaType, ModelPlacement, Mode, Module, ModuleId, ModuleStatus,
    PublishedSnapshot, SnapshotId, Step, StepId, Task, TaskId,
};

/// SQLSTATE codes this store reacts to.
mod sqlstate {
    /// Duplicate key.
    pub const UNIQUE_VIOLATION: &str = "23505";
    /// Missing referenced row.
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    /// Concurrent transaction conflict under SERIALIZABLE.
    pub const SERIALIZATION_FAILURE: &str = "40001";
}

/// SQL schema for the authoring tables.
///
/// Provided for provisioning test databases; production schema changes are
/// managed outside this crate.
pub const AUTHORING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS authoring_assets (
    id UUID PRIMARY KEY,
    original_filename TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size_bytes BIGINT NOT NULL,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT asset_type_check CHECK (asset_type IN ('image', 'audio', 'video', 'gltf', 'model', 'other'))
);

CREATE TABLE IF NOT EXISTS authoring_modules (
    id UUID PRIMARY KEY,
    code TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '1.0',
    mode TEXT NOT NULL DEFAULT 'VR',
    estimated_duration_min INTEGER NOT NULL DEFAULT 0,
    language TEXT NOT NULL DEFAULT 'en',
    icon TEXT NOT NULL DEFAULT '',
    thumbnail_id UUID REFERENCES authoring_assets(id) ON DELETE SET NULL,
    tags JSONB NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'draft',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT module_code_unique UNIQUE (code),
    CONSTRAINT module_status_check CHECK (status IN ('draft', 'published'))
);

CREATE TABLE IF NOT EXISTS authoring_tasks (
    id UUID PRIMARY KEY,
    module_id UUID NOT NULL REFERENCES authoring_modules(id) ON DELETE CASCADE,
    order_index INTEGER NOT NULL CHECK (order_index > 0),
    title TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT task_order_unique UNIQUE (module_id, order_index)
);

CREATE TABLE IF NOT EXISTS authoring_steps (
    id UUID PRIMARY KEY,
    module_id UUID NOT NULL REFERENCES authoring_modules(id) ON DELETE CASCADE,
    task_id UUID REFERENCES authoring_tasks(id) ON DELETE CASCADE,
    order_index INTEGER NOT NULL CHECK (order_index > 0),
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    instruction_type TEXT NOT NULL DEFAULT 'info',
    media_type TEXT,
    media_asset_id UUID REFERENCES authoring_assets(id) ON DELETE SET NULL,
    models JSONB NOT NULL DEFAULT '[]',
    -- Legacy single placement, read-only fallback
    model_asset_id UUID REFERENCES authoring_assets(id) ON DELETE SET NULL,
    model_animation TEXT NOT NULL DEFAULT '',
    model_animation_loop BOOLEAN NOT NULL DEFAULT FALSE,
    model_position_x DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    model_position_y DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    model_position_z DOUBLE PRECISION NOT NULL DEFAULT 2.0,
    model_rotation_x DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    model_rotation_y DOUBLE PRECISION NOT NULL DEFAULT 180.0,
    model_rotation_z DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    model_scale DOUBLE PRECISION NOT NULL DEFAULT 1.0,
    interaction_required_action TEXT NOT NULL DEFAULT '',
    interaction_input_method TEXT NOT NULL DEFAULT '',
    interaction_target TEXT NOT NULL DEFAULT '',
    interaction_hand TEXT NOT NULL DEFAULT '',
    interaction_attempts_allowed INTEGER NOT NULL DEFAULT 0,
    completion_type TEXT NOT NULL DEFAULT '',
    completion_value TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT step_order_unique UNIQUE (task_id, order_index)
);

CREATE INDEX IF NOT EXISTS idx_steps_module ON authoring_steps(module_id);

CREATE TABLE IF NOT EXISTS authoring_step_choices (
    id UUID PRIMARY KEY,
    step_id UUID NOT NULL REFERENCES authoring_steps(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    go_to_step_id UUID REFERENCES authoring_steps(id) ON DELETE SET NULL,
    order_index INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_choices_step ON authoring_step_choices(step_id);

CREATE TABLE IF NOT EXISTS authoring_published_modules (
    id UUID PRIMARY KEY,
    module_id UUID NOT NULL REFERENCES authoring_modules(id) ON DELETE CASCADE,
    version INTEGER NOT NULL,
    schema_version INTEGER NOT NULL DEFAULT 1,
    payload JSONB NOT NULL,
    content_hash TEXT NOT NULL,
    published_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT published_version_unique UNIQUE (module_id, version)
);
"#;

const MODULE_COLUMNS: &str = "id, code, title, description, version, mode, estimated_duration_min, \
     language, icon, thumbnail_id, tags, status, created_at, updated_at";

const TASK_COLUMNS: &str = "id, module_id, order_index, title, description, created_at, updated_at";

const STEP_COLUMNS: &str = "id, module_id, task_id, order_index, title, description, instruction_type, \
     media_type, media_asset_id, models, model_asset_id, model_animation, model_animation_loop, \
     model_position_x, model_position_y, model_position_z, model_rotation_x, model_rotation_y, \
     model_rotation_z, model_scale, interaction_required_action, interaction_input_method, \
     interaction_target, interaction_hand, interaction_attempts_allowed, completion_type, \
     completion_value, created_at, updated_at";

const ASSET_COLUMNS: &str = "id, original_filename, asset_type, mime_type, size_bytes, metadata, created_at";

const SNAPSHOT_COLUMNS: &str = "id, module_id, version, schema_version, payload, content_hash, published_at";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/authoring".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let classified = err.as_database_error().and_then(|db| {
            let detail = db.constraint().unwrap_or_else(|| db.message()).to_string();
            match db.code().as_deref() {
                Some(sqlstate::UNIQUE_VIOLATION) => Some(StoreError::UniqueViolation(detail)),
                Some(sqlstate::SERIALIZATION_FAILURE) => Some(StoreError::SerializationFailure(detail)),
                Some(sqlstate::FOREIGN_KEY_VIOLATION) => Some(StoreError::MissingRow(detail)),
                _ => None,
            }
        });
        classified.unwrap_or(StoreError::Database(err))
    }
}

/// PostgreSQL authoring store.
pub struct PostgresAuthoringStore {
    pool: PgPool,
}

impl PostgresAuthoringStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Create the authoring tables if they do not exist.
    pub async fn apply_schema(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(AUTHORING_SCHEMA).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthoringStore for PostgresAuthoringStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresTx { tx })
    }
}

/// Transaction over a [`PostgresAuthoringStore`]. Rolls back on drop.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn to_index(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_module(row: &PgRow) -> Result<Module, StoreError> {
    let mode: String = row.try_get("mode")?;
    let status: String = row.try_get("status")?;
    let duration: i32 = row.try_get("estimated_duration_min")?;
    let tags: Json<Vec<String>> = row.try_get("tags")?;
    let thumbnail: Option<Uuid> = row.try_get("thumbnail_id")?;

    Ok(Module {
        id: ModuleId::new(row.try_get("id")?),
        code: row.try_get("code")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        version: row.try_get("version")?,
        mode: Mode::from_str(&mode)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown mode: {}", mode)))?,
        estimated_duration_min: to_index(duration, "estimated_duration_min")?,
        language: row.try_get("language")?,
        icon: row.try_get("icon")?,
        thumbnail: thumbnail.map(AssetId::new),
        tags: tags.0,
        status: ModuleStatus::from_str(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status: {}", status)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_task(row: &PgRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: TaskId::new(row.try_get("id")?),
        module_id: ModuleId::new(row.try_get("module_id")?),
        order_index: to_index(row.try_get("order_index")?, "order_index")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_step(row: &PgRow) -> Result<Step, StoreError> {
    let instruction: String = row.try_get("instruction_type")?;
    let media_type: Option<String> = row.try_get("media_type")?;
    let media_asset: Option<Uuid> = row.try_get("media_asset_id")?;
    let task_id: Option<Uuid> = row.try_get("task_id")?;
    let models: Json<Vec<ModelPlacement>> = row.try_get("models")?;

    let legacy_asset: Option<Uuid> = row.try_get("model_asset_id")?;
    let legacy_model = match legacy_asset {
        Some(asset) => Some(ModelPlacement {
            asset: Some(AssetId::new(asset)),
            animation: row.try_get("model_animation")?,
            animation_loop: row.try_get("model_animation_loop")?,
            position: [
                row.try_get("model_position_x")?,
                row.try_get("model_position_y")?,
                row.try_get("model_position_z")?,
            ],
            rotation: [
                row.try_get("model_rotation_x")?,
                row.try_get("model_rotation_y")?,
                row.try_get("model_rotation_z")?,
            ],
            scale: row.try_get("model_scale")?,
        }),
        None => None,
    };

    let required_action: String = row.try_get("interaction_required_action")?;
    let interaction = match non_empty(required_action) {
        Some(required_action) => {
            let hand: String = row.try_get("interaction_hand")?;
            Some(Interaction {
                required_action,
                input_method: non_empty(row.try_get("interaction_input_method")?),
                target: non_empty(row.try_get("interaction_target")?),
                hand: Hand::from_str(&hand),
                attempts_allowed: row.try_get("interaction_attempts_allowed")?,
            })
        }
        None => None,
    };

    let completion_type: String = row.try_get("completion_type")?;
    let completion = match CompletionType::from_str(&completion_type) {
        Some(kind) => Some(CompletionCriterion {
            kind,
            value: row.try_get("completion_value")?,
        }),
        None => None,
    };

    Ok(Step {
        id: StepId::new(row.try_get("id")?),
        module_id: ModuleId::new(row.try_get("module_id")?),
        task_id: task_id.map(TaskId::new),
        order_index: to_index(row.try_get("order_index")?, "order_index")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        instruction_type: InstructionType::from_str(&instruction)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown instruction type: {}", instruction)))?,
        media_type: media_type.as_deref().and_then(MediaType::from_str),
        media_asset: media_asset.map(AssetId::new),
        models: models.0,
        legacy_model,
        interaction,
        completion,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_choice(row: &PgRow) -> Result<Choice, StoreError> {
    let target: Option<Uuid> = row.try_get("go_to_step_id")?;
    Ok(Choice {
        id: ChoiceId::new(row.try_get("id")?),
        step_id: StepId::new(row.try_get("step_id")?),
        label: row.try_get("label")?,
        target: target.map(StepId::new),
        order_index: to_index(row.try_get("order_index")?, "order_index")?,
    })
}

fn parse_asset(row: &PgRow) -> Result<Asset, StoreError> {
    let asset_type: String = row.try_get("asset_type")?;
    let size: i64 = row.try_get("size_bytes")?;
    Ok(Asset {
        id: AssetId::new(row.try_get("id")?),
        original_filename: row.try_get("original_filename")?,
        asset_type: AssetType::from_str(&asset_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown asset type: {}", asset_type)))?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: u64::try_from(size)
            .map_err(|_| StoreError::Corrupt(format!("negative size_bytes: {}", size)))?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_snapshot(row: &PgRow) -> Result<PublishedSnapshot, StoreError> {
    let published_at: DateTime<Utc> = row.try_get("published_at")?;
    Ok(PublishedSnapshot {
        id: SnapshotId::new(row.try_get("id")?),
        module_id: ModuleId::new(row.try_get("module_id")?),
        version: to_index(row.try_get("version")?, "version")?,
        schema_version: to_index(row.try_get("schema_version")?, "schema_version")?,
        payload: row.try_get("payload")?,
        content_hash: row.try_get("content_hash")?,
        published_at,
    })
}

fn collect<T>(rows: &[PgRow], parse: fn(&PgRow) -> Result<T, StoreError>) -> Result<Vec<T>, StoreError> {
    rows.iter().map(parse).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction operations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_module(&mut self, id: &ModuleId) -> Result<Option<Module>, StoreError> {
        let sql = format!("SELECT {} FROM authoring_modules WHERE id = $1", MODULE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_module).transpose()
    }

    async fn get_module_by_code(&mut self, code: &str) -> Result<Option<Module>, StoreError> {
        let sql = format!("SELECT {} FROM authoring_modules WHERE code = $1", MODULE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_module).transpose()
    }

    async fn list_modules(&mut self) -> Result<Vec<Module>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_modules ORDER BY created_at DESC, id DESC",
            MODULE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        collect(&rows, parse_module)
    }

    async fn list_modules_with_status(&mut self, status: ModuleStatus) -> Result<Vec<Module>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_modules WHERE status = $1 ORDER BY created_at DESC, id DESC",
            MODULE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, parse_module)
    }

    async fn insert_module(&mut self, module: &Module) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authoring_modules
                (id, code, title, description, version, mode, estimated_duration_min,
                 language, icon, thumbnail_id, tags, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(module.id.as_uuid())
        .bind(&module.code)
        .bind(&module.title)
        .bind(&module.description)
        .bind(&module.version)
        .bind(module.mode.as_str())
        .bind(module.estimated_duration_min as i32)
        .bind(&module.language)
        .bind(&module.icon)
        .bind(module.thumbnail.map(|a| a.as_uuid()))
        .bind(Json(&module.tags))
        .bind(module.status.as_str())
        .bind(module.created_at)
        .bind(module.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_module(&mut self, module: &Module) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE authoring_modules
            SET code = $2, title = $3, description = $4, version = $5, mode = $6,
                estimated_duration_min = $7, language = $8, icon = $9, thumbnail_id = $10,
                tags = $11, status = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(module.id.as_uuid())
        .bind(&module.code)
        .bind(&module.title)
        .bind(&module.description)
        .bind(&module.version)
        .bind(module.mode.as_str())
        .bind(module.estimated_duration_min as i32)
        .bind(&module.language)
        .bind(&module.icon)
        .bind(module.thumbnail.map(|a| a.as_uuid()))
        .bind(Json(&module.tags))
        .bind(module.status.as_str())
        .bind(module.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("module {}", module.id)));
        }
        Ok(())
    }

    async fn delete_module(&mut self, id: &ModuleId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM authoring_modules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_task(&mut self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {} FROM authoring_tasks WHERE id = $1", TASK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_task).transpose()
    }

    async fn list_tasks(&mut self, module_id: &ModuleId) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_tasks WHERE module_id = $1 ORDER BY order_index, id",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(module_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, parse_task)
    }

    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authoring_tasks
                (id, module_id, order_index, title, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.module_id.as_uuid())
        .bind(task.order_index as i32)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_task(&mut self, task: &Task) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE authoring_tasks SET title = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(task.id.as_uuid())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("task {}", task.id)));
        }
        Ok(())
    }

    async fn set_task_order(&mut self, id: &TaskId, order_index: u32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE authoring_tasks SET order_index = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(order_index as i32)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("task {}", id)));
        }
        Ok(())
    }

    async fn delete_task(&mut self, id: &TaskId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM authoring_tasks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_step(&mut self, id: &StepId) -> Result<Option<Step>, StoreError> {
        let sql = format!("SELECT {} FROM authoring_steps WHERE id = $1", STEP_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_step).transpose()
    }

    async fn list_task_steps(&mut self, task_id: &TaskId) -> Result<Vec<Step>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_steps WHERE task_id = $1 ORDER BY order_index, id",
            STEP_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(task_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, parse_step)
    }

    async fn list_module_steps(&mut self, module_id: &ModuleId) -> Result<Vec<Step>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_steps WHERE module_id = $1 ORDER BY order_index, id",
            STEP_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(module_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, parse_step)
    }

    async fn insert_step(&mut self, step: &Step) -> Result<(), StoreError> {
        let interaction = step.interaction.as_ref();
        sqlx::query(
            r#"
            INSERT INTO authoring_steps
                (id, module_id, task_id, order_index, title, description, instruction_type,
                 media_type, media_asset_id, models,
                 interaction_required_action, interaction_input_method, interaction_target,
                 interaction_hand, interaction_attempts_allowed,
                 completion_type, completion_value, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(step.id.as_uuid())
        .bind(step.module_id.as_uuid())
        .bind(step.task_id.map(|t| t.as_uuid()))
        .bind(step.order_index as i32)
        .bind(&step.title)
        .bind(&step.description)
        .bind(step.instruction_type.as_str())
        .bind(step.media_type.map(|m| m.as_str()))
        .bind(step.media_asset.map(|a| a.as_uuid()))
        .bind(Json(&step.models))
        .bind(interaction.map(|i| i.required_action.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.input_method.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.target.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.hand).map(|h| h.as_str()).unwrap_or_default())
        .bind(interaction.map(|i| i.attempts_allowed).unwrap_or(0))
        .bind(step.completion.as_ref().map(|c| c.kind.as_str()).unwrap_or_default())
        .bind(step.completion.as_ref().map(|c| c.value.clone()).unwrap_or_default())
        .bind(step.created_at)
        .bind(step.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_step(&mut self, step: &Step) -> Result<(), StoreError> {
        let interaction = step.interaction.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE authoring_steps
            SET title = $2, description = $3, instruction_type = $4,
                media_type = $5, media_asset_id = $6, models = $7,
                interaction_required_action = $8, interaction_input_method = $9,
                interaction_target = $10, interaction_hand = $11,
                interaction_attempts_allowed = $12,
                completion_type = $13, completion_value = $14, updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(step.id.as_uuid())
        .bind(&step.title)
        .bind(&step.description)
        .bind(step.instruction_type.as_str())
        .bind(step.media_type.map(|m| m.as_str()))
        .bind(step.media_asset.map(|a| a.as_uuid()))
        .bind(Json(&step.models))
        .bind(interaction.map(|i| i.required_action.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.input_method.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.target.clone()).unwrap_or_default())
        .bind(interaction.and_then(|i| i.hand).map(|h| h.as_str()).unwrap_or_default())
        .bind(interaction.map(|i| i.attempts_allowed).unwrap_or(0))
        .bind(step.completion.as_ref().map(|c| c.kind.as_str()).unwrap_or_default())
        .bind(step.completion.as_ref().map(|c| c.value.clone()).unwrap_or_default())
        .bind(step.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("step {}", step.id)));
        }
        Ok(())
    }

    async fn set_step_position(&mut self, id: &StepId, order_index: u32, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE authoring_steps SET order_index = $2, title = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(order_index as i32)
        .bind(title)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("step {}", id)));
        }
        Ok(())
    }

    async fn delete_step(&mut self, id: &StepId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM authoring_steps WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_choices(&mut self, step_id: &StepId) -> Result<Vec<Choice>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, step_id, label, go_to_step_id, order_index
            FROM authoring_step_choices
            WHERE step_id = $1
            ORDER BY order_index, id
            "#,
        )
        .bind(step_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        collect(&rows, parse_choice)
    }

    async fn insert_choice(&mut self, choice: &Choice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authoring_step_choices (id, step_id, label, go_to_step_id, order_index)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(choice.id.as_uuid())
        .bind(choice.step_id.as_uuid())
        .bind(&choice.label)
        .bind(choice.target.map(|t| t.as_uuid()))
        .bind(choice.order_index as i32)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_choices(&mut self, step_id: &StepId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM authoring_step_choices WHERE step_id = $1")
            .bind(step_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_asset(&mut self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        let sql = format!("SELECT {} FROM authoring_assets WHERE id = $1", ASSET_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_asset).transpose()
    }

    async fn list_assets(&mut self) -> Result<Vec<Asset>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_assets ORDER BY created_at DESC, id DESC",
            ASSET_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        collect(&rows, parse_asset)
    }

    async fn insert_asset(&mut self, asset: &Asset) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authoring_assets
                (id, original_filename, asset_type, mime_type, size_bytes, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(asset.id.as_uuid())
        .bind(&asset.original_filename)
        .bind(asset.asset_type.as_str())
        .bind(&asset.mime_type)
        .bind(i64::try_from(asset.size_bytes).unwrap_or(i64::MAX))
        .bind(&asset.metadata)
        .bind(asset.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_asset(&mut self, id: &AssetId) -> Result<bool, StoreError> {
        // Placement lists live in JSONB and are not covered by ON DELETE SET NULL.
        sqlx::query(
            r#"
            UPDATE authoring_steps
            SET models = (
                SELECT jsonb_agg(
                    CASE WHEN elem->>'asset' = $1::text
                         THEN jsonb_set(elem, '{asset}', 'null'::jsonb)
                         ELSE elem END
                    ORDER BY ord)
                FROM jsonb_array_elements(models) WITH ORDINALITY AS t(elem, ord)
            )
            WHERE models @> jsonb_build_array(jsonb_build_object('asset', $1::text))
            "#,
        )
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        let result = sqlx::query("DELETE FROM authoring_assets WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_snapshot_version(&mut self, module_id: &ModuleId) -> Result<Option<u32>, StoreError> {
        let version: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM authoring_published_modules WHERE module_id = $1",
        )
        .bind(module_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;
        version.map(|v| to_index(v, "version")).transpose()
    }

    async fn latest_snapshot(&mut self, module_id: &ModuleId) -> Result<Option<PublishedSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_published_modules WHERE module_id = $1 ORDER BY version DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(module_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_snapshot).transpose()
    }

    async fn list_snapshots(&mut self, module_id: &ModuleId) -> Result<Vec<PublishedSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM authoring_published_modules WHERE module_id = $1 ORDER BY version DESC",
            SNAPSHOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(module_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(&rows, parse_snapshot)
    }

    async fn insert_snapshot(&mut self, snapshot: &PublishedSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authoring_published_modules
                (id, module_id, version, schema_version, payload, content_hash, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.module_id.as_uuid())
        .bind(snapshot.version as i32)
        .bind(snapshot.schema_version as i32)
        .bind(&snapshot.payload)
        .bind(&snapshot.content_hash)
        .bind(snapshot.published_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
