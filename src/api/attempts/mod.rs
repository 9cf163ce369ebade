mod handlers;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) use handlers::start_attempt;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers", put(handlers::save_answers))
        .route("/:attempt_id/violations", post(handlers::record_violation))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
}
