use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::attempts::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    TooManyRequests(&'static str),
    Attempt(AttemptError),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        Self::Attempt(err)
    }
}

fn attempt_status(err: &AttemptError) -> StatusCode {
    match err {
        AttemptError::ExamNotFound(_)
        | AttemptError::AttemptNotFound(_)
        | AttemptError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
        AttemptError::AttemptLimitExceeded { .. }
        | AttemptError::AttemptNotEditable { .. }
        | AttemptError::AttemptNotGradable { .. }
        | AttemptError::AttemptNotFullyGraded { .. } => StatusCode::CONFLICT,
        AttemptError::AttemptExpired { .. } => StatusCode::GONE,
        AttemptError::PointsOutOfRange { .. } | AttemptError::MalformedAnswer(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AttemptError::Contention => StatusCode::SERVICE_UNAVAILABLE,
        AttemptError::InvalidExam(_) | AttemptError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_body(status: StatusCode, detail: String, code: Option<&'static str>) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail, code })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response =
                    error_body(StatusCode::UNAUTHORIZED, message.to_string(), None);
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => {
                error_body(StatusCode::FORBIDDEN, message.to_string(), None)
            }
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, message, None),
            ApiError::TooManyRequests(message) => {
                error_body(StatusCode::TOO_MANY_REQUESTS, message.to_string(), None)
            }
            ApiError::Attempt(err) => {
                let status = attempt_status(&err);
                let detail = match &err {
                    AttemptError::Storage(inner) => {
                        tracing::error!(error = %inner, "Attempt storage failure");
                        "Internal server error".to_string()
                    }
                    AttemptError::InvalidExam(inner) => {
                        tracing::error!(error = %inner, "Exam configuration rejected");
                        err.to_string()
                    }
                    AttemptError::Contention => {
                        tracing::warn!("Attempt update gave up after repeated conflicts");
                        err.to_string()
                    }
                    _ => err.to_string(),
                };
                error_body(status, detail, Some(err.code()))
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}
