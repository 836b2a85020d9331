mod completion;
mod ids;
mod plan;
mod position;
mod tutor_settings;

pub use completion::{
    CompletedLesson, CompletedLessons, MarkOutcome, ParseUnderstandingError, Understanding,
};
pub use ids::{LearnerId, ParseIdError};
pub use plan::{
    Exercise, KnowledgeLevel, Lesson, Module, ParseKnowledgeLevelError, StudyPlan, StudyPlanError,
};
pub use position::{Position, PositionError};
pub use tutor_settings::{
    DEFAULT_TUTOR_BASE_URL, DEFAULT_TUTOR_MODEL, TutorSettings, TutorSettingsDraft,
    TutorSettingsError,
};
