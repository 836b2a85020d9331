use chrono::{DateTime, Utc};
use pylearn_core::LearnerState;
use pylearn_core::model::{
    CompletedLesson, CompletedLessons, KnowledgeLevel, LearnerId, Position, StudyPlan,
    Understanding,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn learner_id_to_i64(id: LearnerId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("learner_id overflow".into()))
}

pub(crate) fn revision_to_i64(revision: u64) -> Result<i64, StorageError> {
    i64::try_from(revision).map_err(|_| StorageError::Serialization("revision overflow".into()))
}

fn position_from_row(
    row: &SqliteRow,
    module_col: &str,
    lesson_col: &str,
) -> Result<Position, StorageError> {
    let module = i64_to_u32("module", row.try_get::<i64, _>(module_col).map_err(ser)?)?;
    let lesson = i64_to_u32("lesson", row.try_get::<i64, _>(lesson_col).map_err(ser)?)?;
    Position::new(module, lesson).map_err(ser)
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<CompletedLesson, StorageError> {
    let understanding: String = row.try_get("understanding").map_err(ser)?;
    Ok(CompletedLesson::new(
        position_from_row(row, "module_number", "lesson_number")?,
        understanding.parse::<Understanding>().map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    ))
}

/// Combines a `learners` row with its ordered completion rows.
pub(crate) fn map_learner_row(
    row: &SqliteRow,
    completed: CompletedLessons,
) -> Result<LearnerState, StorageError> {
    let level: String = row.try_get("knowledge_level").map_err(ser)?;
    let understanding: String = row.try_get("understanding").map_err(ser)?;
    let plan_json: String = row.try_get("study_plan").map_err(ser)?;
    let course_completed_at: Option<DateTime<Utc>> =
        row.try_get("course_completed_at").map_err(ser)?;

    LearnerState::from_persisted(
        learner_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get("language").map_err(ser)?,
        level.parse::<KnowledgeLevel>().map_err(ser)?,
        StudyPlan::from_json(&plan_json).map_err(ser)?,
        position_from_row(row, "current_module", "current_lesson")?,
        completed,
        understanding.parse::<Understanding>().map_err(ser)?,
        course_completed_at,
        i64_to_u64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
