use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::Attempt;
use crate::db::types::{AttemptStatus, SubmitTrigger};
use crate::services::attempts::{AnswerView, AttemptView, SavedAnswer, SubmitOutcome};
use crate::services::question_bank::{AnswerPayload, Question};
use crate::services::shuffle::QuestionView;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswerRequest {
    pub(crate) payload: AnswerPayload,
    /// Seconds the client believes have passed since start. Logged, never trusted.
    #[serde(default)]
    #[validate(range(min = 0, message = "client_elapsed_seconds must be non-negative"))]
    pub(crate) client_elapsed_seconds: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeQuestionRequest {
    #[validate(range(min = 0.0, message = "points_earned must be non-negative"))]
    pub(crate) points_earned: f64,
    #[serde(default)]
    #[validate(length(max = 10000, message = "feedback must be at most 10000 characters"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ReturnAttemptRequest {
    #[serde(default)]
    #[validate(length(max = 10000, message = "overall_feedback must be at most 10000 characters"))]
    pub(crate) overall_feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListMyAttemptsQuery {
    #[serde(default)]
    pub(crate) exam_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListExamAttemptsQuery {
    #[serde(default)]
    pub(crate) status: Option<AttemptStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) submit_trigger: Option<SubmitTrigger>,
    pub(crate) returned_at: Option<String>,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) max_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_passing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) overall_feedback: Option<String>,
}

impl AttemptResponse {
    /// Scores are only filled in when the caller may see results.
    pub(crate) fn from_attempt(attempt: Attempt, results_visible: bool) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            submitted_at: attempt.submitted_at.map(format_primitive),
            submit_trigger: attempt.submit_trigger,
            returned_at: attempt.returned_at.map(format_primitive),
            time_limit_minutes: attempt.time_limit_minutes,
            max_score: attempt.max_score,
            total_score: results_visible.then_some(attempt.total_score),
            percentage: results_visible.then_some(attempt.percentage),
            is_passing: results_visible.then_some(attempt.is_passing),
            overall_feedback: if results_visible { attempt.overall_feedback } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) question_id: String,
    pub(crate) payload: Option<AnswerPayload>,
    pub(crate) answered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) points_earned: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) graded_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) graded_by_id: Option<String>,
}

impl From<AnswerView> for AnswerResponse {
    fn from(answer: AnswerView) -> Self {
        Self {
            question_id: answer.question_id,
            payload: answer.payload,
            answered_at: answer.answered_at.map(format_primitive),
            points_earned: answer.points_earned,
            is_correct: answer.is_correct,
            feedback: answer.feedback,
            graded_at: answer.graded_at.map(format_primitive),
            graded_by_id: answer.graded_by_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) questions: Vec<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answer_key: Option<Vec<Question>>,
    pub(crate) answers: Vec<AnswerResponse>,
    pub(crate) deadline: Option<String>,
    pub(crate) remaining_seconds: Option<i64>,
}

impl From<AttemptView> for AttemptDetailResponse {
    fn from(view: AttemptView) -> Self {
        Self {
            attempt: AttemptResponse::from_attempt(view.attempt, view.results_visible),
            questions: view.questions,
            answer_key: view.answer_key,
            answers: view.answers.into_iter().map(AnswerResponse::from).collect(),
            deadline: view.deadline.map(format_primitive),
            remaining_seconds: view.remaining_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) resumed: bool,
    #[serde(flatten)]
    pub(crate) detail: AttemptDetailResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveAnswerResponse {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answered_at: String,
    pub(crate) remaining_seconds: Option<i64>,
}

impl From<SavedAnswer> for SaveAnswerResponse {
    fn from(saved: SavedAnswer) -> Self {
        Self {
            attempt_id: saved.attempt_id,
            question_id: saved.question_id,
            answered_at: format_primitive(saved.answered_at),
            remaining_seconds: saved.remaining_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) already_submitted: bool,
    pub(crate) attempt: AttemptResponse,
}

impl SubmitResponse {
    pub(crate) fn from_outcome(outcome: SubmitOutcome, results_visible: bool) -> Self {
        Self {
            already_submitted: outcome.already_submitted,
            attempt: AttemptResponse::from_attempt(outcome.attempt, results_visible),
        }
    }
}
