use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::operations::progress::StudyCard;
use crate::response::AppError;
use crate::routes::{map_study_error, require_user};
use crate::services::review::{self, Difficulty};
use crate::services::scheduler::{self, BatchConstraints};
use crate::services::statistics;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuery {
    category_id: Option<String>,
    max_words: Option<i64>,
    include_new: Option<bool>,
    include_review: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    count: usize,
    words: Vec<StudyCard>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRequest {
    session_id: String,
    word_id: String,
    rating: Difficulty,
}

pub async fn study_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BatchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let defaults = BatchConstraints::default();
    let constraints = BatchConstraints {
        max_words: query.max_words.unwrap_or(defaults.max_words),
        include_new: query.include_new.unwrap_or(defaults.include_new),
        include_review: query.include_review.unwrap_or(defaults.include_review),
    };

    let batch = scheduler::select_study_batch(
        proxy.as_ref(),
        &user.id,
        query.category_id.as_deref(),
        constraints,
    )
    .await
    .map_err(map_study_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: BatchResponse {
            count: batch.len(),
            words: batch,
        },
    }))
}

pub async fn submit_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let outcome = review::submit_response(
        proxy.as_ref(),
        &user.id,
        &payload.session_id,
        &payload.word_id,
        payload.rating,
    )
    .await
    .map_err(map_study_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: outcome,
    }))
}

pub async fn record_word_view(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user) = require_user(&state, &headers).await?;

    let activity = statistics::record_word_view(proxy.as_ref(), &user.id)
        .await
        .map_err(map_study_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: activity,
    }))
}
