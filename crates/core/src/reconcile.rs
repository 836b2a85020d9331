use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CompletedLesson, CompletedLessons, Position, StudyPlan, Understanding};

/// Target of a progress reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub position: Position,
    pub clear_completed: bool,
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self {
            position: Position::start(),
            clear_completed: false,
        }
    }
}

/// Insert a completion record for every lesson the position implies is done.
///
/// Existing records are left untouched. Returns the positions that were added,
/// in plan order.
pub fn backfill_completed(
    plan: &StudyPlan,
    position: Position,
    completed: &mut CompletedLessons,
    understanding: Understanding,
    at: DateTime<Utc>,
) -> Vec<Position> {
    let mut added = Vec::new();
    for (module_number, module) in (1_u32..).zip(plan.modules.iter()) {
        if module_number > position.module() {
            break;
        }
        for lesson_number in 1..=module.lesson_count() {
            let Ok(candidate) = Position::new(module_number, lesson_number) else {
                continue;
            };
            if candidate >= position {
                break;
            }
            if completed.insert(CompletedLesson::new(candidate, understanding, at)) {
                added.push(candidate);
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lesson, Module};
    use crate::progress::calculate_progress;
    use crate::time::fixed_now;

    fn plan() -> StudyPlan {
        let lessons = |n: usize| (0..n).map(|_| Lesson::new("l", "")).collect();
        StudyPlan::new(
            "test",
            vec![Module::new("a", lessons(2)), Module::new("b", lessons(3))],
        )
    }

    fn pos(m: u32, l: u32) -> Position {
        Position::new(m, l).unwrap()
    }

    #[test]
    fn fills_missing_records_only() {
        let plan = plan();
        let mut done = CompletedLessons::new();
        done.mark(pos(1, 2), Understanding::Excellent, fixed_now());

        let added =
            backfill_completed(&plan, pos(2, 2), &mut done, Understanding::Good, fixed_now());
        assert_eq!(added, vec![pos(1, 1), pos(2, 1)]);
        assert_eq!(done.len(), 3);
        assert_eq!(
            done.get(pos(1, 2)).unwrap().understanding,
            Understanding::Excellent
        );

        let snap = calculate_progress(Some(&plan), pos(2, 2), &done);
        assert_eq!(snap.total_completed_lessons, snap.expected_completed);
    }

    #[test]
    fn start_position_adds_nothing() {
        let mut done = CompletedLessons::new();
        let added = backfill_completed(
            &plan(),
            Position::start(),
            &mut done,
            Understanding::Good,
            fixed_now(),
        );
        assert!(added.is_empty());
        assert!(done.is_empty());
    }

    #[test]
    fn second_backfill_is_a_no_op() {
        let plan = plan();
        let mut done = CompletedLessons::new();
        backfill_completed(&plan, pos(2, 3), &mut done, Understanding::Good, fixed_now());
        let again =
            backfill_completed(&plan, pos(2, 3), &mut done, Understanding::Good, fixed_now());
        assert!(again.is_empty());
        assert_eq!(done.len(), 4);
    }
}
