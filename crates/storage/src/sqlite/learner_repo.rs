use pylearn_core::LearnerState;
use pylearn_core::model::{CompletedLessons, LearnerId};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use super::SqliteRepository;
use super::mapping::{
    conn, learner_id_from_i64, learner_id_to_i64, map_completion_row, map_learner_row,
    revision_to_i64, ser,
};
use crate::repository::{LearnerRepository, NewLearnerRecord, StorageError};

const LEARNER_COLUMNS: &str = "id, language, knowledge_level, study_plan, current_module, \
     current_lesson, understanding, course_completed_at, revision, created_at, updated_at";

async fn load_completions(
    db: &mut SqliteConnection,
    id: i64,
) -> Result<CompletedLessons, StorageError> {
    let rows = sqlx::query(
        r"
        SELECT module_number, lesson_number, understanding, completed_at
        FROM completed_lessons
        WHERE learner_id = ?1
        ORDER BY seq ASC
        ",
    )
    .bind(id)
    .fetch_all(&mut *db)
    .await
    .map_err(conn)?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(map_completion_row(row)?);
    }
    Ok(CompletedLessons::from_records(records))
}

async fn write_completions(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    completed: &CompletedLessons,
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM completed_lessons WHERE learner_id = ?1")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(conn)?;

    for (seq, record) in (0_i64..).zip(completed.iter()) {
        sqlx::query(
            r"
            INSERT INTO completed_lessons
                (learner_id, module_number, lesson_number, seq, understanding, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id)
        .bind(i64::from(record.position.module()))
        .bind(i64::from(record.position.lesson()))
        .bind(seq)
        .bind(record.understanding.as_str())
        .bind(record.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(conn)?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl LearnerRepository for SqliteRepository {
    async fn insert_learner(&self, record: NewLearnerRecord) -> Result<LearnerId, StorageError> {
        record.validate()?;
        let plan_json = record.plan.to_json().map_err(ser)?;
        let res = sqlx::query(
            r"
            INSERT INTO learners (
                language, knowledge_level, study_plan, current_module, current_lesson,
                understanding, revision, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, 1, 1, 'fair', 0, ?4, ?4)
            ",
        )
        .bind(record.language.trim())
        .bind(record.knowledge_level.as_str())
        .bind(plan_json)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = learner_id_from_i64(res.last_insert_rowid())?;
        tracing::debug!(learner = %id, "inserted learner");
        Ok(id)
    }

    async fn load_learner_state(
        &self,
        id: LearnerId,
    ) -> Result<Option<LearnerState>, StorageError> {
        let raw_id = learner_id_to_i64(id)?;
        // Row and completions must come from the same revision.
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let row = sqlx::query(&format!("SELECT {LEARNER_COLUMNS} FROM learners WHERE id = ?1"))
            .bind(raw_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;

        let state = match row {
            Some(row) => {
                let completed = load_completions(&mut tx, raw_id).await?;
                Some(map_learner_row(&row, completed)?)
            }
            None => None,
        };
        tx.commit().await.map_err(conn)?;
        Ok(state)
    }

    async fn save_learner_state(&self, state: &LearnerState) -> Result<u64, StorageError> {
        let raw_id = learner_id_to_i64(state.learner_id())?;
        let expected = revision_to_i64(state.revision())?;
        let next = state.revision() + 1;
        let plan_json = state.plan().to_json().map_err(ser)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            UPDATE learners SET
                language = ?1,
                knowledge_level = ?2,
                study_plan = ?3,
                current_module = ?4,
                current_lesson = ?5,
                understanding = ?6,
                course_completed_at = ?7,
                updated_at = ?8,
                revision = revision + 1
            WHERE id = ?9 AND revision = ?10
            ",
        )
        .bind(state.language())
        .bind(state.knowledge_level().as_str())
        .bind(plan_json)
        .bind(i64::from(state.position().module()))
        .bind(i64::from(state.position().lesson()))
        .bind(state.understanding().as_str())
        .bind(state.course_completed_at())
        .bind(state.updated_at())
        .bind(raw_id)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT revision FROM learners WHERE id = ?1")
                    .bind(raw_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(conn)?;
            tx.rollback().await.map_err(conn)?;
            return match found {
                None => Err(StorageError::NotFound),
                Some(found) => {
                    let found = u64::try_from(found)
                        .map_err(|_| StorageError::Serialization("revision sign overflow".into()))?;
                    tracing::warn!(
                        learner = %state.learner_id(),
                        expected = state.revision(),
                        found,
                        "stale learner revision"
                    );
                    Err(StorageError::Conflict {
                        expected: state.revision(),
                        found,
                    })
                }
            };
        }

        write_completions(&mut tx, raw_id, state.completed()).await?;
        tx.commit().await.map_err(conn)?;

        tracing::debug!(
            learner = %state.learner_id(),
            revision = next,
            position = %state.position(),
            "saved learner state"
        );
        Ok(next)
    }

    async fn list_learners(&self, limit: u32) -> Result<Vec<LearnerState>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let rows = sqlx::query(&format!(
            "SELECT {LEARNER_COLUMNS} FROM learners ORDER BY id ASC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        let mut learners = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_id: i64 = sqlx::Row::try_get(&row, "id").map_err(ser)?;
            let completed = load_completions(&mut tx, raw_id).await?;
            learners.push(map_learner_row(&row, completed)?);
        }
        tx.commit().await.map_err(conn)?;
        Ok(learners)
    }
}
