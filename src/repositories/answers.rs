use sqlx::PgPool;

use crate::db::models::AttemptAnswer;
use crate::db::types::AttemptStatus;
use crate::repositories::store::{AnswerWrite, GradeWrite};

pub(crate) const COLUMNS: &str = "\
    question_id, payload, points_earned, is_correct, feedback, graded_at, graded_by_id, \
    answered_at";

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "SELECT {COLUMNS} FROM attempt_answers WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

/// Upserts a student's answer. The status check, the revision bump and the
/// answer write are one statement, so a save can never land after a submit.
pub(crate) async fn save(
    pool: &PgPool,
    attempt_id: &str,
    answer: &AnswerWrite,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "WITH touched AS (
            UPDATE attempts SET revision = revision + 1, updated_at = $6
            WHERE id = $1 AND status = $7
            RETURNING id
        )
        INSERT INTO attempt_answers (
            attempt_id, question_id, payload, points_earned, is_correct, answered_at, updated_at
        )
        SELECT touched.id, $2, $3, $4, $5, $6, $6 FROM touched
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            payload = EXCLUDED.payload,
            points_earned = EXCLUDED.points_earned,
            is_correct = EXCLUDED.is_correct,
            answered_at = EXCLUDED.answered_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(attempt_id)
    .bind(&answer.question_id)
    .bind(sqlx::types::Json(&answer.payload))
    .bind(answer.points_earned)
    .bind(answer.is_correct)
    .bind(answer.answered_at)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Writes one question's grade while the attempt is submitted or graded.
/// Touches only that question's row.
pub(crate) async fn record_grade(
    pool: &PgPool,
    attempt_id: &str,
    grade: &GradeWrite,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "WITH touched AS (
            UPDATE attempts SET revision = revision + 1, updated_at = $7
            WHERE id = $1 AND (status = $8 OR status = $9)
            RETURNING id
        )
        INSERT INTO attempt_answers (
            attempt_id, question_id, points_earned, is_correct, feedback, graded_by_id,
            graded_at, updated_at
        )
        SELECT touched.id, $2, $3, $4, $5, $6, $7, $7 FROM touched
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            points_earned = EXCLUDED.points_earned,
            is_correct = EXCLUDED.is_correct,
            feedback = EXCLUDED.feedback,
            graded_by_id = EXCLUDED.graded_by_id,
            graded_at = EXCLUDED.graded_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(attempt_id)
    .bind(&grade.question_id)
    .bind(grade.points_earned)
    .bind(grade.is_correct)
    .bind(&grade.feedback)
    .bind(&grade.graded_by_id)
    .bind(grade.graded_at)
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::Graded)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
