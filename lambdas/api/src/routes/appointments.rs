use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use domain::appointments::{
    inputs::{BookAppointmentInput, RejectAppointmentInput},
    Appointment,
};

use super::{optional_json, ApiResult};
use crate::{auth::CurrentUser, state::AppState};

// Book an appointment with a doctor
pub async fn book(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<BookAppointmentInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let view = state.appointments.book(&user.identity, input).await?;
    Ok((StatusCode::CREATED, Json(view.appointment)))
}

pub async fn mine(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let appointments: Vec<Appointment> = state
        .appointments
        .list(&user.identity)
        .await?
        .into_iter()
        .map(|view| view.appointment)
        .collect();
    Ok(Json(appointments))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let view = state.appointments.get(&user.identity, &id).await?;
    Ok(Json(view.appointment))
}

pub async fn cancel(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let view = state.appointments.cancel(&user.identity, &id).await?;
    Ok(Json(view.appointment))
}

pub async fn accept(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let view = state.appointments.accept(&user.identity, &id).await?;
    Ok(Json(view.appointment))
}

// The body is optional; a bare PATCH rejects without a reason.
pub async fn reject(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: CurrentUser,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input: RejectAppointmentInput = optional_json(&body)?;
    let view = state
        .appointments
        .reject(&user.identity, &id, input.reason)
        .await?;
    Ok(Json(view.appointment))
}
