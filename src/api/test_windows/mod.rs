mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::api::attempts;
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_test).get(handlers::list_tests))
        .route("/status-preview", get(handlers::preview_status))
        .route(
            "/:test_id",
            get(handlers::get_test)
                .patch(handlers::update_test)
                .put(handlers::update_test)
                .delete(handlers::delete_test),
        )
        .route("/:test_id/attempts", post(attempts::start_attempt))
}
