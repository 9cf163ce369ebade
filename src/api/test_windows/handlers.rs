use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentFaculty, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::{live_status_from_raw, now_utc};
use crate::repositories::TestFilter;
use crate::schemas::test::{
    StatusPreview, StatusPreviewQuery, TestCreate, TestListQuery, TestResponse, TestUpdate,
};

pub(super) async fn create_test(
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Json(payload): Json<TestCreate>,
) -> Result<(StatusCode, Json<TestResponse>), ApiError> {
    payload.validate()?;

    let test = state.windows().create(&faculty.user_id, payload.into(), now_utc()).await?;

    Ok((StatusCode::CREATED, Json(TestResponse::for_viewer(test, &faculty))))
}

pub(super) async fn list_tests(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<TestListQuery>,
) -> Result<Json<Vec<TestResponse>>, ApiError> {
    let filter = TestFilter::from(query);
    let tests = state.windows().find(&filter, now_utc()).await?;

    Ok(Json(tests.into_iter().map(|test| TestResponse::for_viewer(test, &user)).collect()))
}

pub(super) async fn get_test(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let test = state.windows().get(&test_id, now_utc()).await?;
    Ok(Json(TestResponse::for_viewer(test, &user)))
}

pub(super) async fn update_test(
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(payload): Json<TestUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    payload.validate()?;

    let test =
        state.windows().update(&test_id, &faculty.user_id, payload.into(), now_utc()).await?;

    Ok(Json(TestResponse::for_viewer(test, &faculty)))
}

pub(super) async fn delete_test(
    CurrentFaculty(faculty): CurrentFaculty,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.windows().delete(&test_id, &faculty.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Status a window would have right now, for form previews. Never fails on
/// malformed input.
pub(super) async fn preview_status(
    CurrentUser(_): CurrentUser,
    Query(query): Query<StatusPreviewQuery>,
) -> Json<StatusPreview> {
    let status = live_status_from_raw(now_utc(), &query.start_at, query.end_at.as_deref());
    Json(StatusPreview { status })
}
