use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::advance::{Advancement, advance};
use crate::context::{ContextError, ContextWindow, LessonContext};
use crate::model::{
    CompletedLessons, KnowledgeLevel, LearnerId, MarkOutcome, Position, StudyPlan, Understanding,
};
use crate::progress::{ProgressSnapshot, calculate_progress};
use crate::reconcile::{ResetRequest, backfill_completed};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LearnerError {
    #[error("language cannot be empty")]
    EmptyLanguage,

    #[error("updated_at is before created_at")]
    InvalidTimeRange,
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of finishing the current lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The lesson was already recorded; nothing changed.
    AlreadyCompleted { position: Position },
    /// The lesson was recorded and the position moved on (or the course ended).
    Completed {
        position: Position,
        advancement: Advancement,
    },
}

//
// ─── LEARNER STATE ─────────────────────────────────────────────────────────────
//

/// One learner's study plan together with position and completion history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerState {
    learner_id: LearnerId,
    language: String,
    knowledge_level: KnowledgeLevel,
    plan: StudyPlan,
    position: Position,
    completed: CompletedLessons,
    understanding: Understanding,
    course_completed_at: Option<DateTime<Utc>>,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LearnerState {
    /// Fresh learner at the start of a newly generated plan.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError::EmptyLanguage` if `language` is blank.
    pub fn new(
        learner_id: LearnerId,
        language: impl Into<String>,
        knowledge_level: KnowledgeLevel,
        plan: StudyPlan,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LearnerError> {
        let language = language.into();
        if language.trim().is_empty() {
            return Err(LearnerError::EmptyLanguage);
        }
        Ok(Self {
            learner_id,
            language: language.trim().to_owned(),
            knowledge_level,
            plan,
            position: Position::start(),
            completed: CompletedLessons::new(),
            understanding: Understanding::default(),
            course_completed_at: None,
            revision: 0,
            created_at,
            updated_at: created_at,
        })
    }

    /// Rehydrate a learner from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError` if the language is blank or the timestamps are inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        language: String,
        knowledge_level: KnowledgeLevel,
        plan: StudyPlan,
        position: Position,
        completed: CompletedLessons,
        understanding: Understanding,
        course_completed_at: Option<DateTime<Utc>>,
        revision: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, LearnerError> {
        if language.trim().is_empty() {
            return Err(LearnerError::EmptyLanguage);
        }
        if updated_at < created_at {
            return Err(LearnerError::InvalidTimeRange);
        }
        Ok(Self {
            learner_id,
            language,
            knowledge_level,
            plan,
            position,
            completed,
            understanding,
            course_completed_at,
            revision,
            created_at,
            updated_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub fn knowledge_level(&self) -> KnowledgeLevel {
        self.knowledge_level
    }

    #[must_use]
    pub fn plan(&self) -> &StudyPlan {
        &self.plan
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    #[must_use]
    pub fn completed(&self) -> &CompletedLessons {
        &self.completed
    }

    #[must_use]
    pub fn understanding(&self) -> Understanding {
        self.understanding
    }

    #[must_use]
    pub fn course_completed_at(&self) -> Option<DateTime<Utc>> {
        self.course_completed_at
    }

    #[must_use]
    pub fn is_course_complete(&self) -> bool {
        self.course_completed_at.is_some()
    }

    /// Storage revision this state was loaded at.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record the revision assigned by storage after a successful save.
    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Queries

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        calculate_progress(Some(&self.plan), self.position, &self.completed)
    }

    /// # Errors
    ///
    /// Returns `ContextError::StalePosition` if the position no longer points into the plan.
    pub fn context(&self, window: ContextWindow) -> Result<LessonContext, ContextError> {
        LessonContext::assemble(
            &self.plan,
            self.position,
            &self.completed,
            self.knowledge_level,
            window,
        )
    }

    // Transitions

    /// Record the current lesson as finished and move to the next one.
    ///
    /// Re-completing a recorded lesson is a no-op. Finishing the final lesson
    /// keeps the position and stamps `course_completed_at`.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::StalePosition`, with the state untouched, if the
    /// position does not point at a lesson in the plan.
    pub fn complete_current_lesson(
        &mut self,
        understanding: Understanding,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, ContextError> {
        let position = self.position;
        self.ensure_in_plan(position)?;
        if self.completed.mark(position, understanding, now) == MarkOutcome::AlreadyCompleted {
            return Ok(CompletionOutcome::AlreadyCompleted { position });
        }

        self.understanding = understanding;
        let advancement = self.step(now);
        Ok(CompletionOutcome::Completed {
            position,
            advancement,
        })
    }

    /// Move to the next lesson without recording the current one.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::StalePosition`, with the state untouched, if the
    /// position does not point at a lesson in the plan.
    pub fn move_to_next_lesson(&mut self, now: DateTime<Utc>) -> Result<Advancement, ContextError> {
        if self.is_course_complete() {
            return Ok(Advancement::CourseComplete);
        }
        self.ensure_in_plan(self.position)?;
        Ok(self.step(now))
    }

    fn ensure_in_plan(&self, position: Position) -> Result<(), ContextError> {
        match self.plan.lesson(position) {
            Some(_) => Ok(()),
            None => Err(ContextError::StalePosition {
                position,
                modules: self.plan.module_count(),
            }),
        }
    }

    fn step(&mut self, now: DateTime<Utc>) -> Advancement {
        let advancement = advance(&self.plan, self.position);
        match advancement {
            Advancement::Next { position, .. } => self.position = position,
            Advancement::CourseComplete => {
                self.course_completed_at.get_or_insert(now);
            }
        }
        self.updated_at = now;
        advancement
    }

    pub fn set_understanding(&mut self, understanding: Understanding, now: DateTime<Utc>) {
        self.understanding = understanding;
        self.updated_at = now;
    }

    /// Move the learner to an arbitrary lesson, optionally wiping the history.
    ///
    /// Resetting to the first lesson is always allowed.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::StalePosition` if the target is not a lesson in the plan.
    pub fn reset(&mut self, request: ResetRequest, now: DateTime<Utc>) -> Result<(), ContextError> {
        if request.position != Position::start() {
            self.ensure_in_plan(request.position)?;
        }
        self.position = request.position;
        if request.clear_completed {
            self.completed.clear();
        }
        self.course_completed_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Add the completion records implied by the position. See `backfill_completed`.
    pub fn backfill(&mut self, understanding: Understanding, now: DateTime<Utc>) -> Vec<Position> {
        let added = backfill_completed(
            &self.plan,
            self.position,
            &mut self.completed,
            understanding,
            now,
        );
        if !added.is_empty() {
            self.updated_at = now;
        }
        added
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
