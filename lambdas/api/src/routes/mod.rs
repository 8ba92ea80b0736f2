use axum::{
    body::Bytes,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{error::ApiError, state::AppState};

mod accounts;
mod appointments;
mod deliveries;
mod doctors;
mod medicines;
mod notifications;
mod orders;

pub type ApiResult<T> = Result<T, ApiError>;

/// Body that may be left out: empty means `T::default()`, anything else must be valid JSON.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let Json(input) = Json::<T>::from_bytes(body)?;
    Ok(input)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/auth/register", post(accounts::register))
        .route("/auth/otp", post(accounts::request_otp))
        .route("/auth/otp/verify", post(accounts::verify_otp))
        .route("/auth/logout", post(accounts::logout))
        .route("/auth/me", get(accounts::me))
        .route("/admin/accounts", post(accounts::admin_create))
        .route("/admin/accounts/:id", delete(accounts::admin_delete))
        // Catalog
        .route("/medicines", get(medicines::search).post(medicines::create))
        .route("/medicines/:id", get(medicines::get).put(medicines::update))
        .route("/pharmacist/stats", get(orders::stats))
        // Doctors
        .route("/doctors", get(doctors::directory))
        .route(
            "/doctors/specialization/:specialization",
            get(doctors::by_specialization),
        )
        .route("/doctors/:id", get(doctors::get))
        .route("/doctor/patients", get(doctors::patients))
        .route("/doctor/patients/:patient_id/accept", patch(doctors::accept))
        .route("/doctor/patients/:patient_id/reject", patch(doctors::reject))
        // Appointments
        .route("/appointments", post(appointments::book))
        .route("/appointments/mine", get(appointments::mine))
        .route("/appointments/:id", get(appointments::get))
        .route("/appointments/:id/cancel", patch(appointments::cancel))
        .route("/appointments/:id/accept", patch(appointments::accept))
        .route("/appointments/:id/reject", patch(appointments::reject))
        // Prescription orders
        .route(
            "/prescription-orders/upload-prescription",
            post(orders::upload_prescription),
        )
        .route("/prescription-orders/upload-url", post(orders::upload_url))
        .route("/prescription-orders/pending", get(orders::pending))
        .route("/prescription-orders/all", get(orders::all))
        .route("/prescription-orders/mine", get(orders::mine))
        .route("/prescription-orders/:id", get(orders::get))
        .route("/prescription-orders/:id/approve", patch(orders::approve))
        .route("/prescription-orders/:id/reject", patch(orders::reject))
        .route("/prescription-orders/:id/pay", post(orders::pay))
        .route(
            "/prescription-orders/:id/start-processing",
            patch(orders::start_processing),
        )
        .route(
            "/prescription-orders/:id/ready-for-dispatch",
            patch(orders::ready_for_dispatch),
        )
        .route("/prescription-orders/:id/complete", patch(orders::complete))
        // Deliveries
        .route("/deliveries", get(deliveries::list))
        .route("/deliveries/:id/status", patch(deliveries::advance))
        // Notifications
        .route("/notifications", get(notifications::feed))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/mark-all-read", patch(notifications::mark_all_read))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .route("/notifications/:id", delete(notifications::delete))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "mediconnect-api" }))
}
