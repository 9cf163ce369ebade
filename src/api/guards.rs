use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, Identity};
use crate::core::state::AppState;

/// Caller identity taken from a verified bearer token.
pub(crate) struct CurrentUser(pub(crate) Identity);
/// Identity when a valid bearer token is present, `None` when the token is
/// missing, malformed or expired.
pub(crate) struct MaybeUser(pub(crate) Option<Identity>);
pub(crate) struct CurrentFaculty(pub(crate) Identity);
pub(crate) struct CurrentStudent(pub(crate) Identity);

fn bearer_token(parts: &Parts) -> Option<Result<&str, ApiError>> {
    let value = parts.headers.get(header::AUTHORIZATION)?;
    Some(
        value
            .to_str()
            .ok()
            .and_then(|raw| raw.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials")),
    )
}

fn verify(token: &str, state: &AppState) -> Result<Identity, ApiError> {
    security::verify_token(token, state.settings())
        .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))??;

        Ok(CurrentUser(verify(token, state)?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = match bearer_token(parts) {
            Some(Ok(token)) => verify(token, state).ok(),
            _ => None,
        };
        Ok(MaybeUser(identity))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentFaculty {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if identity.is_faculty() {
            Ok(CurrentFaculty(identity))
        } else {
            Err(ApiError::Forbidden("Faculty access required".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if identity.is_faculty() {
            Err(ApiError::Forbidden("Student access required".to_string()))
        } else {
            Ok(CurrentStudent(identity))
        }
    }
}
