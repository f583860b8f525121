use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::response::AppError;
use crate::routes::{map_study_error, require_user};
use crate::services::statistics;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let snapshot = statistics::dashboard_snapshot(proxy.as_ref(), &user.id)
        .await
        .map_err(map_study_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: snapshot,
    }))
}
