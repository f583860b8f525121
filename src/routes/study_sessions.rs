use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::operations::sessions::{self, SessionCounters, StudySession};
use crate::response::AppError;
use crate::routes::{map_study_error, require_user};
use crate::services::session;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    category_id: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
    session: StudySession,
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", post(create_session))
        .route("/user/active", get(get_active_session))
        .route("/:sessionId/end", post(end_session))
        .route("/:sessionId", get(get_session))
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let created = session::start_session(
        proxy.as_ref(),
        &user.id,
        payload.category_id.as_deref(),
        payload.mode.as_deref(),
    )
    .await
    .map_err(map_study_error)?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse {
            success: true,
            data: CreateSessionResponse {
                session_id: created.id.clone(),
                session: created,
            },
        }),
    ))
}

async fn end_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(counters): Json<SessionCounters>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let closed = session::end_session(proxy.as_ref(), &user.id, &session_id, counters)
        .await
        .map_err(map_study_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: closed,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let found = sessions::get_session(proxy.pool(), &session_id)
        .await
        .map_err(|err| map_study_error(err.into()))?
        .ok_or_else(|| AppError::not_found(format!("session not found: {session_id}")))?;

    if found.user_id != user.id {
        return Err(AppError::forbidden("session belongs to another user"));
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: found,
    }))
}

async fn get_active_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let open = sessions::get_open_session(proxy.pool(), &user.id)
        .await
        .map_err(|err| map_study_error(err.into()))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: open,
    }))
}
