use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::format_primitive;
use crate::db::types::AttemptStatus;
use crate::repositories::store::StoreError;
use crate::services::question_bank::QuestionBankError;

/// Rejections of the attempt engine. All of them are recoverable and carry
/// enough context for a caller to explain what happened.
#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("attempt {0} not found")]
    AttemptNotFound(String),
    #[error("question {0} is not part of this attempt")]
    QuestionNotFound(String),
    #[error("attempt limit reached: {used} of {max_attempts} attempts used")]
    AttemptLimitExceeded { max_attempts: i32, used: i64 },
    #[error("attempt is {status} and can no longer be edited")]
    AttemptNotEditable { status: AttemptStatus },
    #[error("time limit for this attempt ended at {}", format_primitive(*deadline))]
    AttemptExpired { deadline: PrimitiveDateTime },
    #[error("attempt is {status} and cannot be graded")]
    AttemptNotGradable { status: AttemptStatus },
    #[error("attempt is {status}; only fully graded attempts can be returned")]
    AttemptNotFullyGraded { status: AttemptStatus },
    #[error("points {points_earned} outside 0..={max_points}")]
    PointsOutOfRange { points_earned: f64, max_points: i32 },
    #[error("malformed answer: {0}")]
    MalformedAnswer(String),
    #[error("exam configuration is invalid: {0}")]
    InvalidExam(#[from] QuestionBankError),
    #[error("attempt kept changing underneath the update")]
    Contention,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub(crate) type AttemptResult<T> = Result<T, AttemptError>;

impl AttemptError {
    /// Stable machine-readable identifier for API clients.
    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::ExamNotFound(_) => "exam_not_found",
            Self::AttemptNotFound(_) => "attempt_not_found",
            Self::QuestionNotFound(_) => "question_not_found",
            Self::AttemptLimitExceeded { .. } => "attempt_limit_exceeded",
            Self::AttemptNotEditable { .. } => "attempt_not_editable",
            Self::AttemptExpired { .. } => "attempt_expired",
            Self::AttemptNotGradable { .. } => "attempt_not_gradable",
            Self::AttemptNotFullyGraded { .. } => "attempt_not_fully_graded",
            Self::PointsOutOfRange { .. } => "points_out_of_range",
            Self::MalformedAnswer(_) => "malformed_answer",
            Self::InvalidExam(_) => "invalid_exam",
            Self::Contention => "contention",
            Self::Storage(_) => "storage",
        }
    }
}
