use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentInput {
    pub doctor_id: String,
    pub appointment_date: DateTime<Utc>,
    pub time_slot: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectAppointmentInput {
    #[serde(default)]
    pub reason: Option<String>,
}
