#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod tutor_service;

pub use pylearn_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError, TutorError};
pub use progress_service::{FixReport, LessonLookup, ProgressService, ProgressStatus};
pub use tutor_service::{ChatCompletionsClient, ContentGenerator, TutorService, render_prompt};
