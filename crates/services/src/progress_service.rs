use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pylearn_core::model::{KnowledgeLevel, LearnerId, Position, StudyPlan, Understanding};
use pylearn_core::{
    Advancement, CompletionOutcome, ContextError, ContextWindow, LearnerState, LessonContext,
    ProgressSnapshot, ResetRequest,
};
use storage::repository::{LearnerRepository, NewLearnerRecord};

use crate::Clock;
use crate::error::ProgressServiceError;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// Learner-facing progress summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStatus {
    pub learner_id: LearnerId,
    pub language: String,
    pub position: Position,
    pub understanding: Understanding,
    pub course_completed_at: Option<DateTime<Utc>>,
    pub progress: ProgressSnapshot,
}

impl ProgressStatus {
    fn of(state: &LearnerState) -> Self {
        Self {
            learner_id: state.learner_id(),
            language: state.language().to_owned(),
            position: state.position(),
            understanding: state.understanding(),
            course_completed_at: state.course_completed_at(),
            progress: state.snapshot(),
        }
    }
}

/// Current-lesson lookup. A stale position is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LessonLookup {
    Found(Box<LessonContext>),
    StalePosition { position: Position, modules: u32 },
}

impl LessonLookup {
    #[must_use]
    pub fn context(&self) -> Option<&LessonContext> {
        match self {
            LessonLookup::Found(ctx) => Some(ctx),
            LessonLookup::StalePosition { .. } => None,
        }
    }
}

/// Completion records added by a progress fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    pub added: Vec<Position>,
    pub progress: ProgressSnapshot,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Loads a learner, runs one progress operation, and persists the result.
///
/// Every write goes through the repository's revision check. A save that lost
/// a race surfaces as `ProgressServiceError::Storage(StorageError::Conflict)`;
/// see `ProgressServiceError::is_conflict`.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    learners: Arc<dyn LearnerRepository>,
    window: ContextWindow,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, learners: Arc<dyn LearnerRepository>) -> Self {
        Self {
            clock,
            learners,
            window: ContextWindow::default(),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    /// Register a learner with a freshly generated plan, positioned at the first lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::InvalidLearner` if the language is blank,
    /// or `ProgressServiceError::Storage` if the learner cannot be stored.
    pub async fn enroll(
        &self,
        language: &str,
        level: KnowledgeLevel,
        plan: StudyPlan,
    ) -> Result<LearnerId, ProgressServiceError> {
        let modules = plan.module_count();
        let draft = LearnerState::new(LearnerId::new(0), language, level, plan, self.clock.now())?;
        let id = self
            .learners
            .insert_learner(NewLearnerRecord::from_state(&draft))
            .await?;
        tracing::info!(learner = %id, language = draft.language(), modules, "learner enrolled");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::LearnerNotFound` or a storage error.
    pub async fn get_progress(
        &self,
        id: LearnerId,
    ) -> Result<ProgressStatus, ProgressServiceError> {
        let state = self.load(id).await?;
        Ok(ProgressStatus::of(&state))
    }

    /// Assemble the display bundle for the learner's current lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::LearnerNotFound` or a storage error.
    pub async fn current_context(
        &self,
        id: LearnerId,
    ) -> Result<LessonLookup, ProgressServiceError> {
        let state = self.load(id).await?;
        match state.context(self.window) {
            Ok(ctx) => Ok(LessonLookup::Found(Box::new(ctx))),
            Err(ContextError::StalePosition { position, modules }) => {
                tracing::warn!(learner = %id, %position, modules, "stale learner position");
                Ok(LessonLookup::StalePosition { position, modules })
            }
        }
    }

    /// Mark the current lesson complete and advance.
    ///
    /// Completing an already recorded lesson writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::StalePosition` without writing when the
    /// position is outside the plan, `LearnerNotFound`, or a storage error
    /// including a revision conflict.
    pub async fn complete_lesson(
        &self,
        id: LearnerId,
        understanding: Understanding,
    ) -> Result<CompletionOutcome, ProgressServiceError> {
        let mut state = self.load(id).await?;
        let outcome = state
            .complete_current_lesson(understanding, self.clock.now())
            .map_err(|err| stale_position(id, err))?;
        match outcome {
            CompletionOutcome::AlreadyCompleted { position } => {
                tracing::debug!(learner = %id, %position, "lesson already completed");
            }
            CompletionOutcome::Completed {
                position,
                advancement,
            } => {
                self.save(&state).await?;
                log_advancement(id, position, advancement);
            }
        }
        Ok(outcome)
    }

    /// Move to the next lesson without recording the current one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::StalePosition` without writing when the
    /// position is outside the plan, `LearnerNotFound`, or a storage error.
    pub async fn next_lesson(&self, id: LearnerId) -> Result<Advancement, ProgressServiceError> {
        let mut state = self.load(id).await?;
        if state.is_course_complete() {
            return Ok(Advancement::CourseComplete);
        }
        let from = state.position();
        let advancement = state
            .move_to_next_lesson(self.clock.now())
            .map_err(|err| stale_position(id, err))?;
        self.save(&state).await?;
        log_advancement(id, from, advancement);
        Ok(advancement)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::LearnerNotFound` or a storage error.
    pub async fn update_understanding(
        &self,
        id: LearnerId,
        understanding: Understanding,
    ) -> Result<(), ProgressServiceError> {
        let mut state = self.load(id).await?;
        state.set_understanding(understanding, self.clock.now());
        self.save(&state).await?;
        Ok(())
    }

    /// Move the learner to `request.position`, optionally clearing completions.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::InvalidResetTarget` when the target is not
    /// a lesson in the plan, or `LearnerNotFound`/storage errors.
    pub async fn reset_progress(
        &self,
        id: LearnerId,
        request: ResetRequest,
    ) -> Result<ProgressStatus, ProgressServiceError> {
        let mut state = self.load(id).await?;
        state.reset(request, self.clock.now())?;
        let revision = self.save(&state).await?;
        state.set_revision(revision);
        tracing::info!(
            learner = %id,
            position = %request.position,
            cleared = request.clear_completed,
            "progress reset"
        );
        Ok(ProgressStatus::of(&state))
    }

    /// Backfill completion records implied by the current position.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::LearnerNotFound` or a storage error.
    pub async fn fix_progress(
        &self,
        id: LearnerId,
        understanding: Understanding,
    ) -> Result<FixReport, ProgressServiceError> {
        let mut state = self.load(id).await?;
        let added = state.backfill(understanding, self.clock.now());
        if !added.is_empty() {
            self.save(&state).await?;
            tracing::info!(learner = %id, added = added.len(), "backfilled completions");
        }
        Ok(FixReport {
            added,
            progress: state.snapshot(),
        })
    }

    async fn load(&self, id: LearnerId) -> Result<LearnerState, ProgressServiceError> {
        self.learners
            .load_learner_state(id)
            .await?
            .ok_or(ProgressServiceError::LearnerNotFound(id))
    }

    async fn save(&self, state: &LearnerState) -> Result<u64, ProgressServiceError> {
        let revision = self.learners.save_learner_state(state).await?;
        Ok(revision)
    }
}

fn stale_position(id: LearnerId, err: ContextError) -> ProgressServiceError {
    let ContextError::StalePosition { position, modules } = err;
    tracing::warn!(learner = %id, %position, modules, "stale learner position");
    ProgressServiceError::StalePosition { position, modules }
}

fn log_advancement(id: LearnerId, from: Position, advancement: Advancement) {
    match advancement {
        Advancement::Next {
            position,
            is_module_complete,
        } => {
            tracing::info!(learner = %id, %from, to = %position, is_module_complete, "advanced");
        }
        Advancement::CourseComplete => {
            tracing::info!(learner = %id, %from, "course complete");
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    use pylearn_core::model::{CompletedLessons, Lesson, Module};
    use pylearn_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    fn plan() -> StudyPlan {
        let lessons = |names: &[&str]| names.iter().map(|n| Lesson::new(*n, "")).collect();
        StudyPlan::new(
            "Python",
            vec![
                Module::new("Basics", lessons(&["Variables", "Types"])),
                Module::new("Flow", lessons(&["If", "Loops"])),
            ],
        )
    }

    async fn service() -> (ProgressService, LearnerId) {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo);
        let id = svc
            .enroll("Python", KnowledgeLevel::Beginner, plan())
            .await
            .unwrap();
        (svc, id)
    }

    fn pos(m: u32, l: u32) -> Position {
        Position::new(m, l).unwrap()
    }

    #[tokio::test]
    async fn missing_learner_is_an_error() {
        let (svc, _) = service().await;
        let err = svc.get_progress(LearnerId::new(99)).await.unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::LearnerNotFound(id) if id == LearnerId::new(99)
        ));
    }

    #[tokio::test]
    async fn complete_twice_is_idempotent() {
        let (svc, id) = service().await;

        let first = svc.complete_lesson(id, Understanding::Good).await.unwrap();
        assert!(matches!(first, CompletionOutcome::Completed { .. }));

        svc.reset_progress(
            id,
            ResetRequest {
                position: pos(1, 1),
                clear_completed: false,
            },
        )
        .await
        .unwrap();

        let second = svc.complete_lesson(id, Understanding::Good).await.unwrap();
        assert_eq!(second, CompletionOutcome::AlreadyCompleted { position: pos(1, 1) });

        let status = svc.get_progress(id).await.unwrap();
        assert_eq!(status.position, pos(1, 1));
        assert_eq!(status.progress.total_completed_lessons, 1);
    }

    #[tokio::test]
    async fn next_lesson_reaches_course_complete() {
        let (svc, id) = service().await;
        for _ in 0..3 {
            assert!(matches!(
                svc.next_lesson(id).await.unwrap(),
                Advancement::Next { .. }
            ));
        }
        assert_eq!(svc.next_lesson(id).await.unwrap(), Advancement::CourseComplete);

        let status = svc.get_progress(id).await.unwrap();
        assert_eq!(status.position, pos(2, 2));
        assert_eq!(status.course_completed_at, Some(fixed_now()));
        assert_eq!(svc.next_lesson(id).await.unwrap(), Advancement::CourseComplete);
    }

    #[tokio::test]
    async fn invalid_reset_target_is_rejected() {
        let (svc, id) = service().await;
        let err = svc
            .reset_progress(
                id,
                ResetRequest {
                    position: pos(3, 1),
                    clear_completed: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::InvalidResetTarget(_)));
    }

    #[tokio::test]
    async fn fix_progress_backfills_once() {
        let (svc, id) = service().await;
        svc.next_lesson(id).await.unwrap();
        svc.next_lesson(id).await.unwrap();

        let report = svc.fix_progress(id, Understanding::Fair).await.unwrap();
        assert_eq!(report.added, vec![pos(1, 1), pos(1, 2)]);
        assert_eq!(report.progress.total_completed_lessons, 2);

        let again = svc.fix_progress(id, Understanding::Fair).await.unwrap();
        assert!(again.added.is_empty());
    }

    #[tokio::test]
    async fn context_reports_stale_position() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo.clone());
        let id = svc
            .enroll("Python", KnowledgeLevel::Beginner, StudyPlan::default())
            .await
            .unwrap();

        let lookup = svc.current_context(id).await.unwrap();
        assert_eq!(
            lookup,
            LessonLookup::StalePosition {
                position: Position::start(),
                modules: 0
            }
        );
        assert!(lookup.context().is_none());

        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["kind"], "stale_position");
        assert_eq!(json["position"]["module"], 1);
    }

    #[tokio::test]
    async fn concurrent_write_conflicts() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo.clone());
        let id = svc
            .enroll("Python", KnowledgeLevel::Beginner, plan())
            .await
            .unwrap();

        let stale = repo.load_learner_state(id).await.unwrap().unwrap();
        svc.complete_lesson(id, Understanding::Good).await.unwrap();

        let err = repo.save_learner_state(&stale).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert!(ProgressServiceError::from(err).is_conflict());
    }

    #[tokio::test]
    async fn enroll_rejects_blank_language() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo.clone());
        let err = svc
            .enroll("   ", KnowledgeLevel::Beginner, plan())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::InvalidLearner(_)));
        assert!(repo.list_learners(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_position_blocks_complete_and_next() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo.clone());
        let id = svc
            .enroll("Python", KnowledgeLevel::Beginner, plan())
            .await
            .unwrap();

        let loaded = repo.load_learner_state(id).await.unwrap().unwrap();
        let shrunk = LearnerState::from_persisted(
            id,
            loaded.language().to_owned(),
            loaded.knowledge_level(),
            loaded.plan().clone(),
            pos(4, 7),
            CompletedLessons::new(),
            Understanding::default(),
            None,
            loaded.revision(),
            loaded.created_at(),
            loaded.updated_at(),
        )
        .unwrap();
        let revision = repo.save_learner_state(&shrunk).await.unwrap();

        let err = svc.complete_lesson(id, Understanding::Good).await.unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::StalePosition { position, modules: 2 } if position == pos(4, 7)
        ));
        let err = svc.next_lesson(id).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::StalePosition { .. }));

        let stored = repo.load_learner_state(id).await.unwrap().unwrap();
        assert_eq!(stored.revision(), revision);
        assert!(stored.completed().is_empty());
        assert_eq!(stored.course_completed_at(), None);

        svc.reset_progress(id, ResetRequest::default()).await.unwrap();
        assert!(matches!(
            svc.complete_lesson(id, Understanding::Good).await.unwrap(),
            CompletionOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn context_window_limits_neighbours() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = ProgressService::new(Clock::Fixed(fixed_now()), repo).with_window(ContextWindow {
            previous: 1,
            next: 1,
            following_modules: 1,
        });
        let id = svc
            .enroll("Python", KnowledgeLevel::Beginner, plan())
            .await
            .unwrap();
        svc.next_lesson(id).await.unwrap();
        svc.next_lesson(id).await.unwrap();

        let lookup = svc.current_context(id).await.unwrap();
        let ctx = lookup.context().unwrap();
        assert_eq!(ctx.lesson_name, "If");
        assert_eq!(ctx.previous_lessons, vec!["Basics - Types"]);
        assert_eq!(ctx.next_lessons, vec!["Flow - Loops"]);
    }
}
