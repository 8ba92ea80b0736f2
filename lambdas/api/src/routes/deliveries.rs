use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use domain::deliveries::{self, AdvanceDeliveryInput};

use super::ApiResult;
use crate::{auth::CurrentUser, state::AppState};

pub async fn list(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    let packages = deliveries::list(state.deliveries.as_ref(), &user.identity).await?;
    Ok(Json(packages))
}

// Move a package one step along the delivery chain
pub async fn advance(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<AdvanceDeliveryInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let package = deliveries::advance(state.deliveries.as_ref(), &user.identity, &id, input).await?;
    Ok(Json(package))
}
