mod dashboard;
mod health;
mod study;
mod study_sessions;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::auth::AuthUser;
use crate::db::DatabaseProxy;
use crate::response::{json_error, AppError};
use crate::services::StudyError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/study/batch", get(study::study_batch))
        .route("/api/study/response", post(study::submit_response))
        .route("/api/study/viewed", post(study::record_word_view))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .nest("/api/study-sessions", study_sessions::router())
        .nest("/health", health::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "resource not found").into_response()
}

pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<DatabaseProxy>, AuthUser), AppError> {
    let token = crate::auth::extract_token(headers)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing auth token"))?;

    let proxy = state.db_proxy().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "service unavailable",
        )
    })?;

    let user = crate::auth::verify_request_token(proxy.as_ref(), &token)
        .await
        .map_err(|_| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "authentication failed, please sign in again",
            )
        })?;

    Ok((proxy, user))
}

pub(crate) fn map_study_error(err: StudyError) -> AppError {
    match err {
        StudyError::Validation(message) => AppError::validation(message),
        StudyError::Forbidden(message) => AppError::forbidden(message),
        StudyError::NotFound(message) => AppError::not_found(message),
        StudyError::Conflict(message) => AppError::conflict(message),
        StudyError::Sql(err) => {
            tracing::error!(error = %err, "store operation failed");
            json_error(StatusCode::BAD_GATEWAY, "DB_ERROR", "database operation failed")
        }
    }
}
