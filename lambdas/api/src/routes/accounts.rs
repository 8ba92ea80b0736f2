use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use domain::{
    accounts::{self, NewAccountInput, Role},
    auth::{RequestOtpInput, VerifyOtpInput},
    Error,
};
use serde_json::json;

use super::ApiResult;
use crate::{auth::CurrentUser, state::AppState};

// Register a patient account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewAccountInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let account = accounts::create_account(state.accounts.as_ref(), input, Role::Patient).await?;
    Ok((StatusCode::CREATED, Json(account.profile())))
}

// Send a sign-in code
pub async fn request_otp(
    State(state): State<AppState>,
    payload: Result<Json<RequestOtpInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    state.auth.request_otp(input).await?;
    Ok(Json(json!({ "message": "OTP sent" })))
}

// Exchange a code for a session
pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let session = state.auth.verify_otp(input).await?;
    Ok(Json(session))
}

pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    state.auth.logout(&user.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<impl IntoResponse> {
    let account = state
        .accounts
        .get(&user.identity.user_id)
        .await?
        .ok_or_else(|| Error::not_found("Account", user.identity.user_id.as_str()))?;
    Ok(Json(account.profile()))
}

// Create an account with any role
pub async fn admin_create(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<NewAccountInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let account = accounts::admin_create(state.accounts.as_ref(), &user.identity, input).await?;
    Ok((StatusCode::CREATED, Json(account.profile())))
}

// Delete an account and its relationships
pub async fn admin_delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    accounts::delete_account(
        state.accounts.as_ref(),
        state.relationships.as_ref(),
        &user.identity,
        &id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
