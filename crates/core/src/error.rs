use thiserror::Error;

use crate::context::ContextError;
use crate::learner::LearnerError;
use crate::model::{PositionError, StudyPlanError, TutorSettingsError};

/// Any domain error raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    StudyPlan(#[from] StudyPlanError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    TutorSettings(#[from] TutorSettingsError),
}
