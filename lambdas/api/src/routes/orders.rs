use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use domain::{
    accounts::Role,
    orders::inputs::{
        ApproveOrderInput, PaymentInput, RejectOrderInput, UploadPrescriptionInput, UploadUrlInput,
    },
    Error,
};

use super::{optional_json, ApiResult};
use crate::{auth::CurrentUser, state::AppState, uploads::prescription_key};

// Upload a prescription, opening an order
pub async fn upload_prescription(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<UploadPrescriptionInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let order = state.orders.submit(&user.identity, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

// Get S3 presigned URL for the prescription image
pub async fn upload_url(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<UploadUrlInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    user.identity.require(Role::Patient)?;
    let Json(input) = payload?;
    if input.file_name.trim().is_empty() {
        return Err(Error::validation("fileName is required").into());
    }
    let key = prescription_key(&user.identity.user_id, &input.file_name);
    let ticket = state.uploads.sign(&key, &input.content_type).await?;
    Ok(Json(ticket))
}

pub async fn pending(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.pending(&user.identity).await?))
}

pub async fn all(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.all(&user.identity).await?))
}

pub async fn mine(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.mine(&user.identity).await?))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.get(&user.identity, &id).await?))
}

// Price the order and take stock
pub async fn approve(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<ApproveOrderInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    Ok(Json(state.orders.approve(&user.identity, &id, input).await?))
}

pub async fn reject(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input: RejectOrderInput = optional_json(&body)?;
    Ok(Json(state.orders.reject(&user.identity, &id, input).await?))
}

pub async fn pay(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<PaymentInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    Ok(Json(state.orders.pay(&user.identity, &id, input).await?))
}

pub async fn start_processing(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.start_processing(&user.identity, &id).await?))
}

// Freeze the delivery snapshot; responds with the order and its package
pub async fn ready_for_dispatch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .orders
            .mark_ready_for_dispatch(&user.identity, &id)
            .await?,
    ))
}

pub async fn complete(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.complete(&user.identity, &id).await?))
}

// Dashboard counters
pub async fn stats(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orders.stats(&user.identity).await?))
}
