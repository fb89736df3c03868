use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_attempt_access, CurrentStudent};
use crate::core::redis::answer_save_key;
use crate::core::state::AppState;
use crate::db::types::{AttemptStatus, SubmitTrigger};
use crate::schemas::attempt::{
    AttemptResponse, ListMyAttemptsQuery, SaveAnswerRequest, SaveAnswerResponse,
    StartAttemptResponse, SubmitResponse,
};
use crate::services::attempts::{SaveRequest, StartRequest, Viewer};

pub(super) async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    let outcome = state
        .attempts()
        .start(StartRequest {
            exam_id,
            student_id: student.id,
            ip_address: super::client_ip(&headers),
            user_agent: super::user_agent(&headers),
        })
        .await?;

    let view = state.attempts().view(&outcome.attempt.id, Viewer::Student).await?;
    let status = if outcome.resumed { StatusCode::OK } else { StatusCode::CREATED };

    Ok((status, Json(StartAttemptResponse { resumed: outcome.resumed, detail: view.into() })))
}

pub(super) async fn list_my_attempts(
    Query(query): Query<ListMyAttemptsQuery>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let attempts =
        state.attempts().list_for_student(&student.id, query.exam_id.as_deref()).await?;

    let response = attempts
        .into_iter()
        .map(|attempt| {
            let visible = attempt.status == AttemptStatus::Returned;
            AttemptResponse::from_attempt(attempt, visible)
        })
        .collect();

    Ok(Json(response))
}

pub(super) async fn save_answer(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<SaveAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    require_attempt_access(&state, &student, &attempt_id).await?;

    let exam_settings = state.settings().exam();
    let allowed = state
        .redis()
        .rate_limit(
            &answer_save_key(&attempt_id),
            exam_settings.save_rate_limit,
            exam_settings.save_rate_window_seconds,
        )
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, attempt_id = %attempt_id, "Save rate limit check failed");
            true
        });
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many answer saves, slow down"));
    }

    let saved = state
        .attempts()
        .save_answer(
            &attempt_id,
            SaveRequest {
                question_id,
                payload: payload.payload,
                client_elapsed_seconds: payload.client_elapsed_seconds,
            },
        )
        .await?;

    Ok(Json(saved.into()))
}

pub(super) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    require_attempt_access(&state, &student, &attempt_id).await?;

    let outcome = state.attempts().submit(&attempt_id, SubmitTrigger::Manual).await?;
    let visible = outcome.attempt.status == AttemptStatus::Returned;

    Ok(Json(SubmitResponse::from_outcome(outcome, visible)))
}
