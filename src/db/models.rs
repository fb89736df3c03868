use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, SubmitTrigger};
use crate::services::question_bank::{AnswerPayload, Question};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamRow {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) max_attempts: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) passing_percentage: f64,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_choices: bool,
}

/// Authoring row for one question. `id`, `order_index` and `points` live in
/// columns; the type-specific body lives in `definition`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamQuestionRow {
    pub(crate) id: String,
    pub(crate) order_index: i32,
    pub(crate) points: i32,
    pub(crate) definition: Json<serde_json::Value>,
}

/// One row per start. Everything needed to score and time the attempt is
/// snapshotted here, so later exam edits never leak into it.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) submit_trigger: Option<SubmitTrigger>,
    pub(crate) returned_at: Option<PrimitiveDateTime>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) passing_percentage: f64,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_choices: bool,
    pub(crate) shuffle_seed: i64,
    pub(crate) questions: Json<Vec<Question>>,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) is_passing: bool,
    pub(crate) overall_feedback: Option<String>,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) revision: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Attempt {
    pub(crate) fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.0.iter().find(|question| question.id == question_id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AttemptAnswer {
    pub(crate) question_id: String,
    pub(crate) payload: Option<Json<AnswerPayload>>,
    pub(crate) points_earned: f64,
    pub(crate) is_correct: Option<bool>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) graded_by_id: Option<String>,
    pub(crate) answered_at: Option<PrimitiveDateTime>,
}
