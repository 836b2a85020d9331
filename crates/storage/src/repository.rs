use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pylearn_core::{LearnerError, LearnerState};
use pylearn_core::model::{KnowledgeLevel, LearnerId, StudyPlan};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("revision conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid learner record: {0}")]
    InvalidRecord(#[from] LearnerError),
}

/// Insert shape for a learner that does not have an id yet.
#[derive(Debug, Clone)]
pub struct NewLearnerRecord {
    pub language: String,
    pub knowledge_level: KnowledgeLevel,
    pub plan: StudyPlan,
    pub created_at: DateTime<Utc>,
}

impl NewLearnerRecord {
    #[must_use]
    pub fn from_state(state: &LearnerState) -> Self {
        Self {
            language: state.language().to_owned(),
            knowledge_level: state.knowledge_level(),
            plan: state.plan().clone(),
            created_at: state.created_at(),
        }
    }

    /// Build the domain state for a freshly assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if the record fails domain validation.
    pub fn into_state(self, id: LearnerId) -> Result<LearnerState, StorageError> {
        let state = LearnerState::new(
            id,
            self.language,
            self.knowledge_level,
            self.plan,
            self.created_at,
        )?;
        Ok(state)
    }

    /// Run the domain checks `into_state` applies, without consuming the record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` for a blank language.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.language.trim().is_empty() {
            return Err(LearnerError::EmptyLanguage.into());
        }
        Ok(())
    }
}

/// Storage collaborator for learner state.
///
/// Saves are guarded by the learner's revision: a save only succeeds when the
/// stored revision still equals `state.revision()`, which makes concurrent
/// complete/advance requests for one learner fail with `Conflict` instead of
/// double-advancing.
#[async_trait]
pub trait LearnerRepository: Send + Sync {
    /// Create a learner at the start of its plan.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the learner cannot be stored.
    async fn insert_learner(&self, record: NewLearnerRecord) -> Result<LearnerId, StorageError>;

    /// Load plan, position, and completion records for a learner.
    ///
    /// Returns `Ok(None)` when the learner does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn load_learner_state(&self, id: LearnerId)
    -> Result<Option<LearnerState>, StorageError>;

    /// Persist position, completion records, and learner metadata.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner is missing and
    /// `StorageError::Conflict` if it was modified since it was loaded.
    async fn save_learner_state(&self, state: &LearnerState) -> Result<u64, StorageError>;

    /// List learners ordered by id, up to the given limit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_learners(&self, limit: u32) -> Result<Vec<LearnerState>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    learners: Arc<Mutex<BTreeMap<LearnerId, LearnerState>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            learners: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

#[async_trait]
impl LearnerRepository for InMemoryRepository {
    async fn insert_learner(&self, record: NewLearnerRecord) -> Result<LearnerId, StorageError> {
        record.validate()?;
        let mut guard = self
            .learners
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let next = guard.keys().next_back().map_or(1, |id| id.value() + 1);
        let id = LearnerId::new(next);
        guard.insert(id, record.into_state(id)?);
        Ok(id)
    }

    async fn load_learner_state(
        &self,
        id: LearnerId,
    ) -> Result<Option<LearnerState>, StorageError> {
        let guard = self
            .learners
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn save_learner_state(&self, state: &LearnerState) -> Result<u64, StorageError> {
        let mut guard = self
            .learners
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard
            .get_mut(&state.learner_id())
            .ok_or(StorageError::NotFound)?;
        if stored.revision() != state.revision() {
            return Err(StorageError::Conflict {
                expected: state.revision(),
                found: stored.revision(),
            });
        }
        let revision = state.revision() + 1;
        let mut next = state.clone();
        next.set_revision(revision);
        *stored = next;
        Ok(revision)
    }

    async fn list_learners(&self, limit: u32) -> Result<Vec<LearnerState>, StorageError> {
        let guard = self
            .learners
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard.values().take(limit).cloned().collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub learners: Arc<dyn LearnerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let learners: Arc<dyn LearnerRepository> = Arc::new(InMemoryRepository::new());
        Self { learners }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylearn_core::model::{Lesson, Module, Position, Understanding};
    use pylearn_core::time::fixed_now;

    fn record() -> NewLearnerRecord {
        NewLearnerRecord {
            language: "Python".into(),
            knowledge_level: KnowledgeLevel::Beginner,
            plan: StudyPlan::new(
                "Python",
                vec![Module::new(
                    "Basics",
                    vec![Lesson::new("Print", ""), Lesson::new("Input", "")],
                )],
            ),
            created_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let repo = InMemoryRepository::new();
        let a = repo.insert_learner(record()).await.unwrap();
        let b = repo.insert_learner(record()).await.unwrap();
        assert_eq!(a, LearnerId::new(1));
        assert_eq!(b, LearnerId::new(2));
        assert_eq!(repo.list_learners(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn round_trips_position_and_completions() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_learner(record()).await.unwrap();

        let mut state = repo.load_learner_state(id).await.unwrap().unwrap();
        state
            .complete_current_lesson(Understanding::Good, fixed_now())
            .unwrap();
        let revision = repo.save_learner_state(&state).await.unwrap();
        assert_eq!(revision, 1);

        let fetched = repo.load_learner_state(id).await.unwrap().unwrap();
        assert_eq!(fetched.position(), Position::new(1, 2).unwrap());
        assert_eq!(fetched.completed().len(), 1);
        assert_eq!(fetched.revision(), 1);
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let repo = InMemoryRepository::new();
        let id = repo.insert_learner(record()).await.unwrap();

        let first = repo.load_learner_state(id).await.unwrap().unwrap();
        let mut second = first.clone();

        repo.save_learner_state(&first).await.unwrap();
        second
            .complete_current_lesson(Understanding::Good, fixed_now())
            .unwrap();
        let err = repo.save_learner_state(&second).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 0,
                found: 1
            }
        ));
    }

    #[tokio::test]
    async fn missing_learner() {
        let repo = InMemoryRepository::new();
        assert!(
            repo.load_learner_state(LearnerId::new(9))
                .await
                .unwrap()
                .is_none()
        );
        let state = record().into_state(LearnerId::new(9)).unwrap();
        let err = repo.save_learner_state(&state).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn blank_language_is_rejected() {
        let repo = InMemoryRepository::new();
        let blank = NewLearnerRecord {
            language: " ".into(),
            ..record()
        };
        assert!(matches!(
            blank.validate(),
            Err(StorageError::InvalidRecord(LearnerError::EmptyLanguage))
        ));
        let err = repo.insert_learner(blank).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
        assert!(repo.list_learners(10).await.unwrap().is_empty());
    }
}
