#![forbid(unsafe_code)]

pub mod advance;
pub mod context;
pub mod error;
pub mod learner;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod time;

pub use advance::{Advancement, advance};
pub use context::{ContextError, ContextWindow, LessonContext};
pub use error::Error;
pub use learner::{CompletionOutcome, LearnerError, LearnerState};
pub use progress::{ModuleProgress, ProgressSnapshot, calculate_progress, expected_completed};
pub use reconcile::{ResetRequest, backfill_completed};
pub use time::Clock;
