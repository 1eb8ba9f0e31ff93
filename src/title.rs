//! Auto-generated step titles.
//!
//! A step title is either *generated* from its position (`"Step 2.3"`, or the
//! legacy single-index form `"Step 3"`) or *custom*. No flag is persisted: the
//! classification is re-derived from the text every time it is needed, so a
//! generated title that an author edits into anything else, even `""`,
//! becomes custom and is never rewritten again.
//!
//! Matching is case-insensitive and tolerates surrounding whitespace.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Classification of a step title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTitle {
    /// Derived from position. `task_index` is `None` for the legacy form.
    Generated {
        /// Task component, if present.
        task_index: Option<u32>,
        /// Step component.
        step_index: u32,
    },
    /// Authored text.
    Custom(String),
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*step\s+(\d+)(?:\.(\d+))?\s*$").expect("title pattern is valid")
    })
}

impl StepTitle {
    /// Classify a title.
    pub fn parse(title: &str) -> Self {
        let custom = || Self::Custom(title.to_string());
        let Some(caps) = pattern().captures(title) else {
            return custom();
        };

        let first = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let second = caps.get(2).map(|m| m.as_str().parse::<u32>().ok());

        match (first, second) {
            (Some(task), Some(Some(step))) => Self::Generated {
                task_index: Some(task),
                step_index: step,
            },
            (Some(step), None) => Self::Generated {
                task_index: None,
                step_index: step,
            },
            // Numeric overflow: not something we could have generated.
            _ => custom(),
        }
    }

    /// Whether this title tracks its position.
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    /// Render the title text.
    pub fn render(&self) -> String {
        match self {
            Self::Generated { task_index: Some(t), step_index } => generated_title(*t, *step_index),
            Self::Generated { task_index: None, step_index } => format!("Step {}", step_index),
            Self::Custom(text) => text.clone(),
        }
    }
}

/// Canonical generated title: `"Step {task}.{step}"`.
pub fn generated_title(task_index: u32, step_index: u32) -> String {
    format!("Step {}.{}", task_index, step_index)
}

/// Title for a duplicated step. Always custom.
pub fn copy_title(original: &str) -> String {
    format!("{} (copy)", original)
}

/// New title for a step that moved to `new_step_index` inside its task.
///
/// Keeps the title's own form: a two-part title keeps its embedded task
/// component, a legacy title stays single-part. `None` for custom titles.
pub fn shifted_title(title: &str, new_step_index: u32) -> Option<String> {
    match StepTitle::parse(title) {
        StepTitle::Generated { task_index, .. } => Some(
            StepTitle::Generated {
                task_index,
                step_index: new_step_index,
            }
            .render(),
        ),
        StepTitle::Custom(_) => None,
    }
}

/// Canonical title for an explicitly repositioned step. `None` for custom
/// titles.
pub fn repositioned_title(title: &str, task_index: u32, new_step_index: u32) -> Option<String> {
    StepTitle::parse(title)
        .is_generated()
        .then(|| generated_title(task_index, new_step_index))
}

/// New title for a step whose task moved from `old_task_index` to
/// `new_task_index`.
///
/// Only two-part titles whose embedded task component equals
/// `old_task_index` are rewritten; the step component is preserved.
pub fn retasked_title(title: &str, old_task_index: u32, new_task_index: u32) -> Option<String> {
    match StepTitle::parse(title) {
        StepTitle::Generated {
            task_index: Some(t),
            step_index,
        } if t == old_task_index => Some(generated_title(new_task_index, step_index)),
        _ => None,
    }
}

/// Title a two-part generated title should have at its actual position, if
/// it currently disagrees. Legacy and custom titles are left alone.
pub fn repaired_title(title: &str, task_index: u32, step_index: u32) -> Option<String> {
    match StepTitle::parse(title) {
        StepTitle::Generated { task_index: Some(_), .. } => {
            let expected = generated_title(task_index, step_index);
            (title.trim() != expected).then_some(expected)
        }
        _ => None,
    }
}
