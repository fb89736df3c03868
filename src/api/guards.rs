use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::Attempt;
use crate::db::types::UserRole;
use crate::services::question_bank::ExamConfig;

/// Caller identity as asserted by a verified access token.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) id: String,
    pub(crate) role: UserRole,
}

pub(crate) struct CurrentUser(pub(crate) Identity);
pub(crate) struct CurrentStudent(pub(crate) Identity);
pub(crate) struct CurrentFaculty(pub(crate) Identity);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentUser(Identity { id: claims.sub, role: claims.role }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Student {
            Ok(CurrentStudent(user))
        } else {
            Err(ApiError::Forbidden("Student access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentFaculty {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Faculty {
            Ok(CurrentFaculty(user))
        } else {
            Err(ApiError::Forbidden("Faculty access required"))
        }
    }
}

/// Loads the exam and checks that `faculty` owns it.
pub(crate) async fn require_exam_owner(
    state: &AppState,
    faculty: &Identity,
    exam_id: &str,
) -> Result<ExamConfig, ApiError> {
    let exam = state.attempts().exam(exam_id).await?;

    if exam.owner_id != faculty.id {
        return Err(ApiError::Forbidden("Not enough permissions for this exam"));
    }

    Ok(exam)
}

/// Loads the attempt and checks that `user` may act on it: students only on
/// their own attempts, faculty only on attempts of exams they own.
pub(crate) async fn require_attempt_access(
    state: &AppState,
    user: &Identity,
    attempt_id: &str,
) -> Result<Attempt, ApiError> {
    let attempt = state.attempts().attempt(attempt_id).await?;

    match user.role {
        UserRole::Student if attempt.student_id == user.id => Ok(attempt),
        UserRole::Student => Err(ApiError::Forbidden("Not enough permissions for this attempt")),
        UserRole::Faculty => {
            require_exam_owner(state, user, &attempt.exam_id).await?;
            Ok(attempt)
        }
    }
}
