use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, CurrentUser, MaybeUser};
use crate::core::state::AppState;
use crate::core::time::{format_offset, now_utc};
use crate::schemas::attempt::{
    answer_inputs, AttemptSnapshot, SaveAnswersRequest, SaveAnswersResponse,
    StartAttemptResponse, SubmitRequest, SubmitResponse, ViolationRequest, ViolationResponse,
};

/// Body that may be omitted entirely. A body that is present but does not
/// parse is still a 400.
fn optional_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

pub(crate) async fn start_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    let attempt = state.attempts().start(&test_id, &student.email, now_utc()).await?;
    Ok((StatusCode::CREATED, Json(StartAttemptResponse::from(&attempt))))
}

pub(super) async fn get_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptSnapshot>, ApiError> {
    let attempt = state.attempts().get(&attempt_id, &user).await?;
    Ok(Json(AttemptSnapshot::at(&attempt, now_utc())))
}

pub(super) async fn save_answers(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<Json<SaveAnswersResponse>, ApiError> {
    payload.validate()?;

    let answers = answer_inputs(&payload.answers);
    let attempt =
        state.attempts().save_answers(&attempt_id, &student.email, &answers, now_utc()).await?;

    Ok(Json(SaveAnswersResponse {
        attempt_id: attempt.id,
        updated_at: format_offset(attempt.updated_at),
    }))
}

/// Proctoring clients may report without a session; a verified student token
/// takes precedence over the email in the body.
pub(super) async fn record_violation(
    MaybeUser(user): MaybeUser,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    payload: Result<Json<ViolationRequest>, JsonRejection>,
) -> Result<Json<ViolationResponse>, ApiError> {
    let body_email = optional_body(payload)?.student_email;
    let reporter = match user {
        Some(identity) if !identity.is_faculty() => Some(identity.email),
        _ => body_email.filter(|email| !email.trim().is_empty()),
    };

    let attempt =
        state.attempts().record_violation(&attempt_id, reporter.as_deref(), now_utc()).await?;

    Ok(Json(ViolationResponse::from(&attempt)))
}

pub(super) async fn submit_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let payload = optional_body(payload)?;
    payload.validate()?;

    let answers = answer_inputs(&payload.answers);
    let attempt = state
        .attempts()
        .submit(&attempt_id, &student.email, &answers, payload.forfeit, now_utc())
        .await?;

    Ok(Json(SubmitResponse::from(&attempt)))
}
