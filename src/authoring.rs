//! Module, task and step content operations.
//!
//! Everything here edits content in place. Operations that move rows
//! (insert, delete, reorder, duplicate) live in [`crate::ordering`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{AuthoringError, AuthoringResult};
use crate::store::{AuthoringStore, StoreTx};
use crate::types::{
    code_base_from_title, code_candidate, AssetId, Choice, ChoiceInput, CompletionCriterion,
    InstructionType, Interaction, MediaType, ModelPlacement, Mode, Module, ModuleId, ModuleStatus,
    Step, StepId, Task, TaskId,
};

/// Collision suffixes tried before giving up on a generated code.
const MAX_CODE_ATTEMPTS: u32 = 1000;

/// Editable module metadata.
#[derive(Debug, Clone)]
pub struct ModuleDraft {
    /// Display title (required).
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Content version label.
    pub version: String,
    /// Runtime mode.
    pub mode: Mode,
    /// Estimated duration in minutes.
    pub estimated_duration_min: u32,
    /// Content language.
    pub language: String,
    /// Icon name.
    pub icon: String,
    /// Thumbnail asset.
    pub thumbnail: Option<AssetId>,
    /// Catalog tags.
    pub tags: Vec<String>,
}

impl ModuleDraft {
    /// Draft with a title and default metadata.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            version: "1.0".to_string(),
            mode: Mode::default(),
            estimated_duration_min: 0,
            language: "en".to_string(),
            icon: String::new(),
            thumbnail: None,
            tags: Vec::new(),
        }
    }

    fn apply_to(self, module: &mut Module) {
        module.title = self.title.trim().to_string();
        module.description = self.description;
        module.version = self.version;
        module.mode = self.mode;
        module.estimated_duration_min = self.estimated_duration_min;
        module.language = self.language;
        module.icon = self.icon;
        module.thumbnail = self.thumbnail;
        module.tags = self.tags;
    }
}

/// Editable step content. Position and task are not part of it.
#[derive(Debug, Clone, Default)]
pub struct StepContent {
    /// Title. Anything other than the generated pattern is custom.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Instruction kind.
    pub instruction_type: InstructionType,
    /// Kind of the attached media.
    pub media_type: Option<MediaType>,
    /// Attached 2D media.
    pub media_asset: Option<AssetId>,
    /// 3D model placements.
    pub models: Vec<ModelPlacement>,
    /// Required interaction.
    pub interaction: Option<Interaction>,
    /// Completion criterion.
    pub completion: Option<CompletionCriterion>,
}

impl StepContent {
    /// Current content of a step.
    pub fn of(step: &Step) -> Self {
        Self {
            title: step.title.clone(),
            description: step.description.clone(),
            instruction_type: step.instruction_type,
            media_type: step.media_type,
            media_asset: step.media_asset,
            models: step.models.clone(),
            interaction: step.interaction.clone(),
            completion: step.completion.clone(),
        }
    }

    fn referenced_assets(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.media_asset
            .into_iter()
            .chain(self.models.iter().filter_map(|m| m.asset))
    }
}

/// Content-editing service.
pub struct AuthoringService<S: AuthoringStore> {
    store: Arc<S>,
}

impl<S: AuthoringStore> Clone for AuthoringService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AuthoringStore + 'static> AuthoringService<S> {
    /// Create a service over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Modules
    // ─────────────────────────────────────────────────────────────────────

    /// Create a draft module.
    ///
    /// Without an explicit code, one is derived from the title and suffixed
    /// `_001`, `_002`, ... until unique.
    pub async fn create_module(&self, draft: ModuleDraft, code: Option<&str>) -> AuthoringResult<Module> {
        if draft.title.trim().is_empty() {
            return Err(AuthoringError::validation("module title is required"));
        }

        let mut tx = self.store.begin().await?;
        if let Some(thumbnail) = &draft.thumbnail {
            ensure_asset(&mut tx, thumbnail).await?;
        }

        let code = match code.map(str::trim) {
            Some("") => return Err(AuthoringError::validation("module code must not be blank")),
            Some(explicit) => {
                if tx.get_module_by_code(explicit).await?.is_some() {
                    return Err(AuthoringError::validation(format!("module code {} is taken", explicit)));
                }
                explicit.to_string()
            }
            None => generate_code(&mut tx, &draft.title).await?,
        };

        let mut module = Module::new(code, draft.title.trim());
        draft.apply_to(&mut module);
        tx.insert_module(&module).await?;
        tx.commit().await?;

        tracing::info!(module_id = %module.id, code = %module.code, "Module created");
        Ok(module)
    }

    /// Replace a module's metadata. The code and status are unchanged.
    pub async fn update_module(&self, module_id: &ModuleId, draft: ModuleDraft) -> AuthoringResult<Module> {
        if draft.title.trim().is_empty() {
            return Err(AuthoringError::validation("module title is required"));
        }

        let mut tx = self.store.begin().await?;
        let mut module = load_module(&mut tx, module_id).await?;
        if let Some(thumbnail) = &draft.thumbnail {
            ensure_asset(&mut tx, thumbnail).await?;
        }

        draft.apply_to(&mut module);
        module.updated_at = Utc::now();
        tx.update_module(&module).await?;
        tx.commit().await?;

        tracing::info!(module_id = %module.id, code = %module.code, "Module updated");
        Ok(module)
    }

    /// Delete a module with everything it owns.
    pub async fn delete_module(&self, module_id: &ModuleId) -> AuthoringResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_module(module_id).await? {
            return Err(AuthoringError::not_found("module", module_id));
        }
        tx.commit().await?;

        tracing::info!(module_id = %module_id, "Module deleted");
        Ok(())
    }

    /// Fetch a module.
    pub async fn get_module(&self, module_id: &ModuleId) -> AuthoringResult<Module> {
        let mut tx = self.store.begin().await?;
        load_module(&mut tx, module_id).await
    }

    /// Fetch a module by code.
    pub async fn get_module_by_code(&self, code: &str) -> AuthoringResult<Module> {
        let mut tx = self.store.begin().await?;
        tx.get_module_by_code(code)
            .await?
            .ok_or_else(|| AuthoringError::not_found("module", code))
    }

    /// Modules newest first, optionally filtered by status.
    pub async fn list_modules(&self, status: Option<ModuleStatus>) -> AuthoringResult<Vec<Module>> {
        let mut tx = self.store.begin().await?;
        let modules = match status {
            Some(status) => tx.list_modules_with_status(status).await?,
            None => tx.list_modules().await?,
        };
        Ok(modules)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────

    /// Tasks of a module in order.
    pub async fn list_tasks(&self, module_id: &ModuleId) -> AuthoringResult<Vec<Task>> {
        let mut tx = self.store.begin().await?;
        load_module(&mut tx, module_id).await?;
        Ok(tx.list_tasks(module_id).await?)
    }

    /// Change a task's title and description.
    pub async fn update_task(&self, task_id: &TaskId, title: &str, description: Option<&str>) -> AuthoringResult<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AuthoringError::validation("task title is required"));
        }

        let mut tx = self.store.begin().await?;
        let mut task = tx
            .get_task(task_id)
            .await?
            .ok_or_else(|| AuthoringError::not_found("task", task_id))?;
        task.title = title.to_string();
        task.description = description.map(str::to_string);
        task.updated_at = Utc::now();
        tx.update_task(&task).await?;
        tx.commit().await?;

        tracing::info!(task_id = %task.id, module_id = %task.module_id, "Task updated");
        Ok(task)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch a step.
    pub async fn get_step(&self, step_id: &StepId) -> AuthoringResult<Step> {
        let mut tx = self.store.begin().await?;
        load_step(&mut tx, step_id).await
    }

    /// Steps of a task in order.
    pub async fn list_steps(&self, task_id: &TaskId) -> AuthoringResult<Vec<Step>> {
        let mut tx = self.store.begin().await?;
        if tx.get_task(task_id).await?.is_none() {
            return Err(AuthoringError::not_found("task", task_id));
        }
        Ok(tx.list_task_steps(task_id).await?)
    }

    /// Replace a step's content.
    ///
    /// Referenced assets must exist. A legacy single placement stays as it
    /// is; it only shows when `models` is empty.
    pub async fn update_step_content(&self, step_id: &StepId, content: StepContent) -> AuthoringResult<Step> {
        if content.media_asset.is_some() && content.media_type.is_none() {
            return Err(AuthoringError::validation("media asset needs a media type"));
        }
        if let Some(interaction) = &content.interaction {
            if interaction.attempts_allowed < 0 {
                return Err(AuthoringError::validation("attempts allowed must not be negative"));
            }
        }

        let mut tx = self.store.begin().await?;
        let mut step = load_step(&mut tx, step_id).await?;
        for asset in content.referenced_assets() {
            ensure_asset(&mut tx, &asset).await?;
        }

        step.title = content.title;
        step.description = content.description;
        step.instruction_type = content.instruction_type;
        step.media_type = content.media_type;
        step.media_asset = content.media_asset;
        step.models = content.models;
        step.interaction = content.interaction;
        step.completion = content.completion;
        step.updated_at = Utc::now();
        tx.update_step(&step).await?;
        tx.commit().await?;

        tracing::info!(step_id = %step.id, module_id = %step.module_id, "Step content updated");
        Ok(step)
    }

    /// Choices of a step in order.
    pub async fn list_choices(&self, step_id: &StepId) -> AuthoringResult<Vec<Choice>> {
        let mut tx = self.store.begin().await?;
        load_step(&mut tx, step_id).await?;
        Ok(tx.list_choices(step_id).await?)
    }

    /// Replace every choice of a step. Order follows the list.
    ///
    /// Labels must be non-blank and targets must be steps of the same module.
    pub async fn set_choices(&self, step_id: &StepId, choices: Vec<ChoiceInput>) -> AuthoringResult<Vec<Choice>> {
        if let Some(blank) = choices.iter().position(|c| c.label.trim().is_empty()) {
            return Err(AuthoringError::validation(format!("choice {} has no label", blank + 1)));
        }

        let mut tx = self.store.begin().await?;
        let step = load_step(&mut tx, step_id).await?;

        let siblings: HashSet<StepId> = tx
            .list_module_steps(&step.module_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        for target in choices.iter().filter_map(|c| c.target) {
            if !siblings.contains(&target) {
                return Err(AuthoringError::validation(format!(
                    "choice target {} is not a step of this module",
                    target
                )));
            }
        }

        tx.delete_choices(&step.id).await?;
        let mut created = Vec::with_capacity(choices.len());
        for (i, input) in choices.into_iter().enumerate() {
            let choice = Choice::new(step.id, input.label.trim(), input.target, i as u32 + 1);
            tx.insert_choice(&choice).await?;
            created.push(choice);
        }
        tx.commit().await?;

        tracing::info!(step_id = %step.id, choices = created.len(), "Choices replaced");
        Ok(created)
    }
}

async fn generate_code<T: StoreTx>(tx: &mut T, title: &str) -> AuthoringResult<String> {
    let base = code_base_from_title(title);
    for n in 0..MAX_CODE_ATTEMPTS {
        let candidate = code_candidate(&base, n);
        if tx.get_module_by_code(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AuthoringError::ConstraintViolation(format!(
        "no free module code for base {}",
        base
    )))
}

async fn load_module<T: StoreTx>(tx: &mut T, module_id: &ModuleId) -> AuthoringResult<Module> {
    tx.get_module(module_id)
        .await?
        .ok_or_else(|| AuthoringError::not_found("module", module_id))
}

async fn load_step<T: StoreTx>(tx: &mut T, step_id: &StepId) -> AuthoringResult<Step> {
    tx.get_step(step_id)
        .await?
        .ok_or_else(|| AuthoringError::not_found("step", step_id))
}

async fn ensure_asset<T: StoreTx>(tx: &mut T, asset_id: &AssetId) -> AuthoringResult<()> {
    match tx.get_asset(asset_id).await? {
        Some(_) => Ok(()),
        None => Err(AuthoringError::not_found("asset", asset_id)),
    }
}
