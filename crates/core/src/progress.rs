//! Progress calculation over a study plan.
//!
//! The learner's position is authoritative for "at least this many lessons are
//! done"; the explicit completion records may add out-of-order completions on
//! top of that. Records pointing outside the plan are ignored, so the completed
//! count never exceeds the number of lessons in the plan.

use serde::Serialize;

use crate::model::{CompletedLessons, Position, StudyPlan};

/// Completion breakdown for a single module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_number: u32,
    pub completed_lessons: u32,
    pub total_lessons: u32,
    pub is_completed: bool,
}

/// Derived, read-only summary of a learner's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_lessons: u32,
    pub total_completed_lessons: u32,
    pub expected_completed: u32,
    pub progress_percentage: u8,
    pub module_progress: Vec<ModuleProgress>,
}

impl ProgressSnapshot {
    /// One-based ordinal of the lesson being taught ("lesson N of M").
    ///
    /// Zero for an empty plan; never exceeds `total_lessons`.
    #[must_use]
    pub fn current_ordinal(&self) -> u32 {
        self.total_completed_lessons
            .saturating_add(1)
            .min(self.total_lessons)
    }

    #[must_use]
    pub fn is_course_finished(&self) -> bool {
        self.total_lessons > 0 && self.total_completed_lessons >= self.total_lessons
    }
}

/// Lessons the position implies are done: every lesson of earlier modules plus
/// the lessons before the current one in the current module.
#[must_use]
pub fn expected_completed(plan: &StudyPlan, position: Position) -> u32 {
    let earlier: u32 = plan
        .modules
        .iter()
        .take(position.module_index())
        .fold(0_u32, |acc, m| acc.saturating_add(m.lesson_count()));
    let current = position
        .lesson()
        .saturating_sub(1)
        .min(plan.lesson_count(position.module()));
    earlier.saturating_add(current)
}

/// Compute a `ProgressSnapshot`; an absent or empty plan yields all zeros.
#[must_use]
pub fn calculate_progress(
    plan: Option<&StudyPlan>,
    position: Position,
    completed: &CompletedLessons,
) -> ProgressSnapshot {
    let Some(plan) = plan.filter(|p| !p.is_empty()) else {
        return ProgressSnapshot::default();
    };

    let total_lessons = plan.total_lessons();
    let expected = expected_completed(plan, position);
    let recorded = u32::try_from(
        completed
            .iter()
            .filter(|r| plan.lesson(r.position).is_some())
            .count(),
    )
    .unwrap_or(u32::MAX);
    let total_completed_lessons = recorded.max(expected);

    let module_progress = plan
        .modules
        .iter()
        .zip(1_u32..)
        .map(|(module, number)| {
            let total = module.lesson_count();
            let done = match number.cmp(&position.module()) {
                std::cmp::Ordering::Less => total,
                std::cmp::Ordering::Equal => position.lesson().saturating_sub(1).min(total),
                std::cmp::Ordering::Greater => 0,
            };
            ModuleProgress {
                module_number: number,
                completed_lessons: done,
                total_lessons: total,
                is_completed: total > 0 && done >= total,
            }
        })
        .collect();

    ProgressSnapshot {
        total_lessons,
        total_completed_lessons,
        expected_completed: expected,
        progress_percentage: percentage(total_completed_lessons, total_lessons),
        module_progress,
    }
}

// Rounds half up.
fn percentage(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = u64::from(done.min(total));
    let total = u64::from(total);
    let pct = (done * 200 + total) / (total * 2);
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
