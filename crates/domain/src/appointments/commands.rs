use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::Identity;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Patient books a visit with a doctor
    BookAppointment {
        id: String,
        actor: Identity,
        doctor_id: String,
        appointment_date: DateTime<Utc>,
        time_slot: String,
        reason: Option<String>,
    },

    /// Patient cancels their own appointment
    CancelAppointment { actor: Identity },

    /// Doctor confirms the visit
    AcceptAppointment { actor: Identity },

    /// Doctor declines the visit
    RejectAppointment {
        actor: Identity,
        reason: Option<String>,
    },
}
