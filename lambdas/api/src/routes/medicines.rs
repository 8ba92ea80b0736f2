use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use domain::{
    catalog::{self, MedicineInput},
    Error,
};
use serde::Deserialize;

use super::ApiResult;
use crate::{auth::CurrentUser, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

// Search the catalog
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let medicines = catalog::search(state.catalog.as_ref(), params.query.as_deref()).await?;
    Ok(Json(medicines))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let medicine = state
        .catalog
        .get(&id)
        .await?
        .ok_or_else(|| Error::not_found("Medicine", id.as_str()))?;
    Ok(Json(medicine))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<MedicineInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    user.identity.require_inventory_manager()?;
    let Json(input) = payload?;
    let medicine = catalog::create(state.catalog.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(medicine)))
}

pub async fn update(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<MedicineInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    user.identity.require_inventory_manager()?;
    let Json(input) = payload?;
    let medicine = catalog::update(state.catalog.as_ref(), &id, input).await?;
    Ok(Json(medicine))
}
