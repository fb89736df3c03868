mod faculty;
mod student;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{require_attempt_access, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::UserRole;
use crate::schemas::attempt::AttemptDetailResponse;
use crate::services::attempts::Viewer;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/exams/:exam_id/attempts",
            post(student::start_attempt).get(faculty::list_exam_attempts),
        )
        .route("/exams/:exam_id/return-graded", post(faculty::return_graded))
        .route("/exams/:exam_id/statistics", get(faculty::exam_statistics))
        .route("/attempts/mine", get(student::list_my_attempts))
        .route("/attempts/:attempt_id", get(get_attempt))
        .route("/attempts/:attempt_id/answers/:question_id", put(student::save_answer))
        .route("/attempts/:attempt_id/submit", post(student::submit_attempt))
        .route(
            "/attempts/:attempt_id/questions/:question_id/grade",
            post(faculty::grade_question),
        )
        .route("/attempts/:attempt_id/return", post(faculty::return_attempt))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    require_attempt_access(&state, &user, &attempt_id).await?;

    let viewer = match user.role {
        UserRole::Student => Viewer::Student,
        UserRole::Faculty => Viewer::Faculty,
    };
    let view = state.attempts().view(&attempt_id, viewer).await?;

    Ok(Json(view.into()))
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .map(str::to_string)
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.chars().take(512).collect())
}
