//! Shared error types for the services crate.

use thiserror::Error;

use pylearn_core::model::{LearnerId, Position, TutorSettingsError};
use pylearn_core::{ContextError, LearnerError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("learner {0} not found")]
    LearnerNotFound(LearnerId),
    #[error(transparent)]
    InvalidLearner(#[from] LearnerError),
    #[error("position {position} is outside the study plan ({modules} modules); reset required")]
    StalePosition { position: Position, modules: u32 },
    #[error("invalid reset target: {0}")]
    InvalidResetTarget(#[from] ContextError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    /// True when the learner changed between load and save.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict { .. }))
    }
}

/// Errors emitted by `TutorService` and its content generators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TutorError {
    #[error("tutor is not configured")]
    Disabled,
    #[error("tutor returned an empty response")]
    EmptyResponse,
    #[error("tutor request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Settings(#[from] TutorSettingsError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
