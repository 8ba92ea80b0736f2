use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use domain::notifications;
use serde_json::json;

use super::ApiResult;
use crate::{auth::CurrentUser, state::AppState};

pub async fn feed(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    let feed = notifications::feed(state.notifications.as_ref(), &user.identity).await?;
    Ok(Json(feed))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let count = notifications::unread_count(state.notifications.as_ref(), &user.identity).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_read(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let notification =
        notifications::mark_read(state.notifications.as_ref(), &user.identity, &id).await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let updated = notifications::mark_all_read(state.notifications.as_ref(), &user.identity).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    notifications::delete(state.notifications.as_ref(), &user.identity, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
