use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::repositories::store::{AggregateWrite, ReturnWrite, SubmissionWrite};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, status, started_at, submitted_at, \
    submit_trigger, returned_at, time_limit_minutes, passing_percentage, shuffle_questions, \
    shuffle_choices, shuffle_seed, questions, total_score, max_score, percentage, is_passing, \
    overall_feedback, ip_address, user_agent, revision, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE exam_id = $1 AND student_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_finished(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND student_id = $2 AND status <> $3",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_one(executor)
    .await
}

/// Returns false when a uniqueness constraint rejected the row: either another
/// in-progress attempt exists or the attempt number was taken.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &Attempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, exam_id, student_id, attempt_number, status, started_at, time_limit_minutes,
            passing_percentage, shuffle_questions, shuffle_choices, shuffle_seed, questions,
            total_score, max_score, percentage, is_passing, ip_address, user_agent, revision,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)
        ON CONFLICT DO NOTHING",
    )
    .bind(&attempt.id)
    .bind(&attempt.exam_id)
    .bind(&attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(attempt.status)
    .bind(attempt.started_at)
    .bind(attempt.time_limit_minutes)
    .bind(attempt.passing_percentage)
    .bind(attempt.shuffle_questions)
    .bind(attempt.shuffle_choices)
    .bind(attempt.shuffle_seed)
    .bind(&attempt.questions)
    .bind(attempt.total_score)
    .bind(attempt.max_score)
    .bind(attempt.percentage)
    .bind(attempt.is_passing)
    .bind(&attempt.ip_address)
    .bind(&attempt.user_agent)
    .bind(attempt.revision)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Seals an in-progress attempt and writes the authoritative per-answer
/// scores. Applies only if nobody touched the attempt since `expected_revision`.
pub(crate) async fn seal(
    pool: &PgPool,
    attempt_id: &str,
    expected_revision: i64,
    write: &SubmissionWrite,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE attempts
         SET status = $3, submitted_at = $4, submit_trigger = $5, total_score = $6,
             percentage = $7, is_passing = $8, revision = revision + 1, updated_at = $4
         WHERE id = $1 AND revision = $2 AND status = $9",
    )
    .bind(attempt_id)
    .bind(expected_revision)
    .bind(write.status)
    .bind(write.submitted_at)
    .bind(write.trigger)
    .bind(write.total_score)
    .bind(write.percentage)
    .bind(write.is_passing)
    .bind(AttemptStatus::InProgress)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for score in &write.scores {
        sqlx::query(
            "UPDATE attempt_answers SET points_earned = $3, is_correct = $4, updated_at = $5
             WHERE attempt_id = $1 AND question_id = $2",
        )
        .bind(attempt_id)
        .bind(&score.question_id)
        .bind(score.points_earned)
        .bind(score.is_correct)
        .bind(write.submitted_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

pub(crate) async fn update_aggregate(
    pool: &PgPool,
    attempt_id: &str,
    expected_revision: i64,
    write: &AggregateWrite,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts
         SET total_score = $3, percentage = $4, is_passing = $5, status = $6, updated_at = $7
         WHERE id = $1 AND revision = $2 AND (status = $8 OR status = $9)",
    )
    .bind(attempt_id)
    .bind(expected_revision)
    .bind(write.total_score)
    .bind(write.percentage)
    .bind(write.is_passing)
    .bind(write.status)
    .bind(write.updated_at)
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::Graded)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_returned(
    pool: &PgPool,
    attempt_id: &str,
    expected_revision: i64,
    write: &ReturnWrite,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET status = $3, overall_feedback = $4, returned_at = $5, total_score = $6,
             percentage = $7, is_passing = $8, revision = revision + 1, updated_at = $5
         WHERE id = $1 AND revision = $2 AND status = $9
         RETURNING {COLUMNS}"
    ))
    .bind(attempt_id)
    .bind(expected_revision)
    .bind(AttemptStatus::Returned)
    .bind(&write.overall_feedback)
    .bind(write.returned_at)
    .bind(write.total_score)
    .bind(write.percentage)
    .bind(write.is_passing)
    .bind(AttemptStatus::Graded)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
    exam_id: Option<&str>,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM attempts WHERE student_id = "
    ));
    builder.push_bind(student_id);

    if let Some(exam_id) = exam_id {
        builder.push(" AND exam_id = ");
        builder.push_bind(exam_id);
    }

    builder.push(" ORDER BY started_at DESC");
    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<AttemptStatus>,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM attempts WHERE exam_id = "));
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY student_id, attempt_number");
    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

/// In-progress attempts whose deadline is at or before `now`, oldest first.
pub(crate) async fn list_expired_ids(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM attempts
         WHERE status = $1
           AND time_limit_minutes IS NOT NULL
           AND started_at + make_interval(mins => time_limit_minutes) <= $2
         ORDER BY started_at
         LIMIT $3",
    )
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}
