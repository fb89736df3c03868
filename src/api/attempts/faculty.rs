use axum::{
    extract::{Path, Query, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_attempt_access, require_exam_owner, CurrentFaculty};
use crate::core::state::AppState;
use crate::schemas::attempt::{
    AttemptResponse, GradeQuestionRequest, ListExamAttemptsQuery, ReturnAttemptRequest,
};
use crate::services::attempts::GradeRequest;
use crate::services::grading::{BulkReturnReport, ExamStatistics};

pub(super) async fn list_exam_attempts(
    Path(exam_id): Path<String>,
    Query(query): Query<ListExamAttemptsQuery>,
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    require_exam_owner(&state, &faculty, &exam_id).await?;

    let attempts = state.attempts().list_for_exam(&exam_id, query.status).await?;
    Ok(Json(
        attempts.into_iter().map(|attempt| AttemptResponse::from_attempt(attempt, true)).collect(),
    ))
}

pub(super) async fn grade_question(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Json(payload): Json<GradeQuestionRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    require_attempt_access(&state, &faculty, &attempt_id).await?;

    let attempt = state
        .attempts()
        .grade_question(
            &attempt_id,
            GradeRequest {
                question_id,
                points_earned: payload.points_earned,
                feedback: payload.feedback,
                graded_by_id: faculty.id,
            },
        )
        .await?;

    Ok(Json(AttemptResponse::from_attempt(attempt, true)))
}

pub(super) async fn return_attempt(
    Path(attempt_id): Path<String>,
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Json(payload): Json<ReturnAttemptRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    require_attempt_access(&state, &faculty, &attempt_id).await?;

    let attempt =
        state.attempts().return_to_student(&attempt_id, payload.overall_feedback).await?;

    Ok(Json(AttemptResponse::from_attempt(attempt, true)))
}

pub(super) async fn return_graded(
    Path(exam_id): Path<String>,
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Json(payload): Json<ReturnAttemptRequest>,
) -> Result<Json<BulkReturnReport>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    require_exam_owner(&state, &faculty, &exam_id).await?;

    let report = state.attempts().return_all_graded(&exam_id, payload.overall_feedback).await?;
    Ok(Json(report))
}

pub(super) async fn exam_statistics(
    Path(exam_id): Path<String>,
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
) -> Result<Json<ExamStatistics>, ApiError> {
    require_exam_owner(&state, &faculty, &exam_id).await?;

    Ok(Json(state.attempts().statistics(&exam_id).await?))
}
