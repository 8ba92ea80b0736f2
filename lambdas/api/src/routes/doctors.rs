use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use domain::{accounts, relationships};
use serde::Deserialize;

use super::ApiResult;
use crate::{auth::CurrentUser, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryParams {
    pub search: Option<String>,
}

// Public doctor directory
pub async fn directory(
    State(state): State<AppState>,
    Query(params): Query<DirectoryParams>,
) -> ApiResult<impl IntoResponse> {
    let doctors = accounts::doctors(state.accounts.as_ref(), params.search.as_deref()).await?;
    Ok(Json(doctors))
}

pub async fn by_specialization(
    Path(specialization): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let doctors = accounts::doctors_by_specialization(state.accounts.as_ref(), &specialization).await?;
    Ok(Json(doctors))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(accounts::doctor(state.accounts.as_ref(), &id).await?))
}

// List the caller's patients
pub async fn patients(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let entries = relationships::patients_of(
        state.relationships.as_ref(),
        state.accounts.as_ref(),
        &user.identity,
    )
    .await?;
    Ok(Json(entries))
}

pub async fn accept(
    Path(patient_id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    respond(state, user, patient_id, true).await
}

pub async fn reject(
    Path(patient_id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    respond(state, user, patient_id, false).await
}

async fn respond(
    state: AppState,
    user: CurrentUser,
    patient_id: String,
    accept: bool,
) -> ApiResult<Json<relationships::DoctorPatient>> {
    let relation = relationships::respond(
        state.relationships.as_ref(),
        &state.gateway,
        &user.identity,
        &patient_id,
        accept,
    )
    .await?;
    Ok(Json(relation))
}
