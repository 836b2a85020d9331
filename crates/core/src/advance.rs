use serde::Serialize;

use crate::model::{Position, StudyPlan};

/// Outcome of moving past the current lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advancement {
    /// A following lesson exists. `is_module_complete` is set when the move
    /// rolled over into a later module.
    Next {
        position: Position,
        is_module_complete: bool,
    },
    /// No lesson follows; the learner has finished the plan.
    CourseComplete,
}

impl Advancement {
    #[must_use]
    pub fn next_position(&self) -> Option<Position> {
        match self {
            Advancement::Next { position, .. } => Some(*position),
            Advancement::CourseComplete => None,
        }
    }

    #[must_use]
    pub fn is_module_complete(&self) -> bool {
        matches!(
            self,
            Advancement::Next {
                is_module_complete: true,
                ..
            } | Advancement::CourseComplete
        )
    }

    #[must_use]
    pub fn is_course_complete(&self) -> bool {
        matches!(self, Advancement::CourseComplete)
    }
}

/// Compute the position after `current`.
///
/// Rolls over to the first lesson of the next module that has lessons; modules
/// without lessons are skipped. Returns `CourseComplete` when nothing follows.
#[must_use]
pub fn advance(plan: &StudyPlan, current: Position) -> Advancement {
    let next_lesson = current.lesson().saturating_add(1);
    if next_lesson <= plan.lesson_count(current.module()) {
        if let Ok(position) = Position::new(current.module(), next_lesson) {
            return Advancement::Next {
                position,
                is_module_complete: false,
            };
        }
    }

    let following = current.module().saturating_add(1)..=plan.module_count();
    for module in following {
        if plan.lesson_count(module) == 0 {
            continue;
        }
        if let Ok(position) = Position::new(module, 1) {
            return Advancement::Next {
                position,
                is_module_complete: true,
            };
        }
    }

    Advancement::CourseComplete
}
