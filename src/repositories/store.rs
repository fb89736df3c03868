use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::{AttemptStatus, SubmitTrigger};
use crate::repositories::{answers, attempts, exams};
use crate::services::question_bank::{AnswerPayload, ExamConfig};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub(crate) struct AnswerWrite {
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) points_earned: f64,
    pub(crate) is_correct: Option<bool>,
    pub(crate) answered_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoreWrite {
    pub(crate) question_id: String,
    pub(crate) points_earned: f64,
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionWrite {
    pub(crate) status: AttemptStatus,
    pub(crate) trigger: SubmitTrigger,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) total_score: f64,
    pub(crate) percentage: f64,
    pub(crate) is_passing: bool,
    pub(crate) scores: Vec<ScoreWrite>,
}

#[derive(Debug, Clone)]
pub(crate) struct GradeWrite {
    pub(crate) question_id: String,
    pub(crate) points_earned: f64,
    pub(crate) is_correct: Option<bool>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by_id: String,
    pub(crate) graded_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct AggregateWrite {
    pub(crate) status: AttemptStatus,
    pub(crate) total_score: f64,
    pub(crate) percentage: f64,
    pub(crate) is_passing: bool,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct ReturnWrite {
    pub(crate) overall_feedback: Option<String>,
    pub(crate) returned_at: PrimitiveDateTime,
    pub(crate) total_score: f64,
    pub(crate) percentage: f64,
    pub(crate) is_passing: bool,
}

/// Read side of the exam configuration collaborator.
#[async_trait]
pub(crate) trait ExamSource: Send + Sync {
    async fn load_exam(&self, exam_id: &str) -> StoreResult<Option<ExamConfig>>;
}

/// Persistence of attempts and their answers.
///
/// Every mutating call is a compare-and-set: it reports `false` (or `None`)
/// instead of failing when the attempt moved on underneath the caller.
#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<Attempt>>;

    async fn find_in_progress(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Attempt>>;

    /// Attempts of this student on this exam that are no longer in progress.
    async fn count_finished(&self, exam_id: &str, student_id: &str) -> StoreResult<i64>;

    /// `false` when the single-in-progress or attempt-number constraint fired.
    async fn insert_attempt(&self, attempt: &Attempt) -> StoreResult<bool>;

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<AttemptAnswer>>;

    /// Applies only while the attempt is in progress; bumps its revision.
    async fn save_answer(&self, attempt_id: &str, answer: &AnswerWrite) -> StoreResult<bool>;

    async fn seal_attempt(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &SubmissionWrite,
    ) -> StoreResult<bool>;

    /// Applies only while the attempt is submitted or graded; bumps its revision.
    async fn record_grade(&self, attempt_id: &str, grade: &GradeWrite) -> StoreResult<bool>;

    async fn update_aggregate(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &AggregateWrite,
    ) -> StoreResult<bool>;

    async fn mark_returned(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &ReturnWrite,
    ) -> StoreResult<Option<Attempt>>;

    async fn list_for_student(
        &self,
        student_id: &str,
        exam_id: Option<&str>,
    ) -> StoreResult<Vec<Attempt>>;

    async fn list_for_exam(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>>;

    async fn list_expired(&self, now: PrimitiveDateTime, limit: i64) -> StoreResult<Vec<String>>;
}

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamSource for PgStore {
    async fn load_exam(&self, exam_id: &str) -> StoreResult<Option<ExamConfig>> {
        let Some(exam) = exams::find_by_id(&self.pool, exam_id).await? else {
            return Ok(None);
        };
        let questions = exams::list_questions(&self.pool, exam_id).await?;

        Ok(Some(ExamConfig {
            id: exam.id,
            owner_id: exam.owner_id,
            title: exam.title,
            max_attempts: exam.max_attempts,
            time_limit_minutes: exam.time_limit_minutes,
            passing_percentage: exam.passing_percentage,
            shuffle_questions: exam.shuffle_questions,
            shuffle_choices: exam.shuffle_choices,
            questions,
        }))
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        Ok(attempts::find_by_id(&self.pool, attempt_id).await?)
    }

    async fn find_in_progress(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Attempt>> {
        Ok(attempts::find_in_progress(&self.pool, exam_id, student_id).await?)
    }

    async fn count_finished(&self, exam_id: &str, student_id: &str) -> StoreResult<i64> {
        Ok(attempts::count_finished(&self.pool, exam_id, student_id).await?)
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> StoreResult<bool> {
        Ok(attempts::create(&self.pool, attempt).await?)
    }

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<AttemptAnswer>> {
        Ok(answers::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn save_answer(&self, attempt_id: &str, answer: &AnswerWrite) -> StoreResult<bool> {
        Ok(answers::save(&self.pool, attempt_id, answer).await?)
    }

    async fn seal_attempt(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &SubmissionWrite,
    ) -> StoreResult<bool> {
        Ok(attempts::seal(&self.pool, attempt_id, expected_revision, write).await?)
    }

    async fn record_grade(&self, attempt_id: &str, grade: &GradeWrite) -> StoreResult<bool> {
        Ok(answers::record_grade(&self.pool, attempt_id, grade).await?)
    }

    async fn update_aggregate(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &AggregateWrite,
    ) -> StoreResult<bool> {
        Ok(attempts::update_aggregate(&self.pool, attempt_id, expected_revision, write).await?)
    }

    async fn mark_returned(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &ReturnWrite,
    ) -> StoreResult<Option<Attempt>> {
        Ok(attempts::mark_returned(&self.pool, attempt_id, expected_revision, write).await?)
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        exam_id: Option<&str>,
    ) -> StoreResult<Vec<Attempt>> {
        Ok(attempts::list_by_student(&self.pool, student_id, exam_id).await?)
    }

    async fn list_for_exam(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>> {
        Ok(attempts::list_by_exam(&self.pool, exam_id, status).await?)
    }

    async fn list_expired(&self, now: PrimitiveDateTime, limit: i64) -> StoreResult<Vec<String>> {
        Ok(attempts::list_expired_ids(&self.pool, now, limit).await?)
    }
}
