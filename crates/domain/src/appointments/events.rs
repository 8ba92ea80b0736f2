use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    AppointmentBooked {
        id: String,
        patient_id: String,
        patient_name: String,
        doctor_id: String,
        appointment_date: DateTime<Utc>,
        time_slot: String,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    },

    AppointmentCancelled {
        id: String,
        patient_id: String,
        doctor_id: String,
        updated_at: DateTime<Utc>,
    },

    AppointmentAccepted {
        id: String,
        patient_id: String,
        doctor_id: String,
        updated_at: DateTime<Utc>,
    },

    AppointmentRejected {
        id: String,
        patient_id: String,
        doctor_id: String,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::AppointmentBooked { .. } => "Appointment:Booked".to_string(),
            Event::AppointmentCancelled { .. } => "Appointment:Cancelled".to_string(),
            Event::AppointmentAccepted { .. } => "Appointment:Accepted".to_string(),
            Event::AppointmentRejected { .. } => "Appointment:Rejected".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
