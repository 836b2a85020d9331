//! Display-ready bundle for the lesson a learner is currently on.
//!
//! The neighbouring-lesson lists feed the tutor prompt and are deliberately
//! truncated (see `ContextWindow`).

use serde::Serialize;
use thiserror::Error;

use crate::model::{CompletedLessons, Exercise, KnowledgeLevel, Lesson, Module, Position, StudyPlan};
use crate::progress::{ProgressSnapshot, calculate_progress};

const DEFAULT_EXERCISE_DESCRIPTION: &str = "Practice exercise";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("position {position} is outside the study plan ({modules} modules)")]
    StalePosition { position: Position, modules: u32 },
}

/// Bounds on the neighbouring-lesson titles carried in a `LessonContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    /// Most recent preceding lessons to keep.
    pub previous: usize,
    /// Following lessons to keep.
    pub next: usize,
    /// How many modules after the current one may contribute following lessons.
    pub following_modules: u32,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            previous: 5,
            next: 3,
            following_modules: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContext {
    pub position: Position,
    pub module_name: String,
    pub lesson_name: String,
    pub lesson_content: String,
    pub exercise: Exercise,
    pub objectives: Vec<String>,
    pub difficulty: KnowledgeLevel,
    pub previous_lessons: Vec<String>,
    pub next_lessons: Vec<String>,
    pub progress: ProgressSnapshot,
}

impl LessonContext {
    /// Join the plan, position, and completion records into a lesson bundle.
    ///
    /// `level` is used as the difficulty when the lesson does not carry one.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::StalePosition` when the plan has no lesson at `position`.
    pub fn assemble(
        plan: &StudyPlan,
        position: Position,
        completed: &CompletedLessons,
        level: KnowledgeLevel,
        window: ContextWindow,
    ) -> Result<Self, ContextError> {
        let stale = || ContextError::StalePosition {
            position,
            modules: plan.module_count(),
        };
        let module = plan.module(position.module()).ok_or_else(stale)?;
        let lesson = plan.lesson(position).ok_or_else(stale)?;

        let mut exercise = lesson.exercise.clone();
        if exercise.description.trim().is_empty() {
            exercise.description = DEFAULT_EXERCISE_DESCRIPTION.to_string();
        }

        Ok(Self {
            position,
            module_name: module_title(module, position.module()),
            lesson_name: lesson_title(lesson, position.lesson()),
            lesson_content: lesson.content.clone(),
            exercise,
            objectives: lesson.objectives.clone(),
            difficulty: lesson.difficulty.unwrap_or(level),
            previous_lessons: previous_lessons(plan, position, window.previous),
            next_lessons: next_lessons(plan, position, window),
            progress: calculate_progress(Some(plan), position, completed),
        })
    }
}

fn module_title(module: &Module, number: u32) -> String {
    let name = module.name.trim();
    if name.is_empty() {
        format!("Module {number}")
    } else {
        name.to_string()
    }
}

fn lesson_title(lesson: &Lesson, number: u32) -> String {
    let name = lesson.name.trim();
    if name.is_empty() {
        format!("Lesson {number}")
    } else {
        name.to_string()
    }
}

fn breadcrumb(module: &Module, module_number: u32, lesson: &Lesson, lesson_number: u32) -> String {
    format!(
        "{} - {}",
        module_title(module, module_number),
        lesson_title(lesson, lesson_number)
    )
}

fn numbered<T>(items: &[T]) -> impl Iterator<Item = (u32, &T)> {
    (1_u32..).zip(items.iter())
}

fn previous_lessons(plan: &StudyPlan, position: Position, keep: usize) -> Vec<String> {
    let mut titles = Vec::new();
    for (m, module) in numbered(&plan.modules).take(position.module_index().saturating_add(1)) {
        for (l, lesson) in numbered(&module.lessons) {
            if Position::new(m, l).is_ok_and(|p| p < position) {
                titles.push(breadcrumb(module, m, lesson, l));
            }
        }
    }
    let skip = titles.len().saturating_sub(keep);
    titles.split_off(skip)
}

fn next_lessons(plan: &StudyPlan, position: Position, window: ContextWindow) -> Vec<String> {
    let last_module = position.module().saturating_add(window.following_modules);
    let mut titles = Vec::new();
    for (m, module) in numbered(&plan.modules) {
        if m < position.module() || m > last_module {
            continue;
        }
        for (l, lesson) in numbered(&module.lessons) {
            if titles.len() >= window.next {
                return titles;
            }
            if m > position.module() || l > position.lesson() {
                titles.push(breadcrumb(module, m, lesson, l));
            }
        }
    }
    titles
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
