use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountStore, Identity, Role},
    errors::Error,
};

use super::{Command, Event};

/// Appointment workflow status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum AppointmentStatus {
    /// Booked by the patient, waiting for the doctor
    #[default]
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Appointment aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: AppointmentStatus,

    pub patient_id: String,
    pub patient_name: String,
    pub doctor_id: String,
    pub appointment_date: DateTime<Utc>,
    pub time_slot: String,
    pub reason: Option<String>,
    pub rejection_reason: Option<String>,
}

pub const AGGREGATE_TYPE: &str = "Appointment";

#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<dyn AccountStore>,
}

impl Services {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl Aggregate for Appointment {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::BookAppointment {
                id,
                actor,
                doctor_id,
                appointment_date,
                time_slot,
                reason,
            } => {
                if !self.id.is_empty() {
                    return Err(Error::validation(format!("appointment {id} already exists")));
                }
                actor.require(Role::Patient)?;
                let time_slot = time_slot.trim().to_string();
                if time_slot.is_empty() {
                    return Err(Error::validation("timeSlot is required"));
                }

                let doctor = services
                    .accounts
                    .get(&doctor_id)
                    .await?
                    .filter(|account| account.role == Role::Doctor)
                    .ok_or_else(|| Error::not_found("Doctor", doctor_id.as_str()))?;
                let patient = services
                    .accounts
                    .get(&actor.user_id)
                    .await?
                    .ok_or_else(|| Error::not_found("Patient", actor.user_id.as_str()))?;

                Ok(vec![Event::AppointmentBooked {
                    id,
                    patient_id: patient.id,
                    patient_name: patient.name,
                    doctor_id: doctor.id,
                    appointment_date,
                    time_slot,
                    reason,
                    created_at: Utc::now(),
                }])
            }

            Command::CancelAppointment { actor } => {
                self.validate_existing()?;
                if actor.role != Role::Patient || actor.user_id != self.patient_id {
                    return Err(Error::forbidden("appointment belongs to another patient"));
                }
                match self.status {
                    AppointmentStatus::Pending | AppointmentStatus::Accepted => {}
                    AppointmentStatus::Rejected | AppointmentStatus::Cancelled => {
                        return Err(self.invalid_state("cancel", "Pending or Accepted"))
                    }
                }

                Ok(vec![Event::AppointmentCancelled {
                    id: self.id.clone(),
                    patient_id: self.patient_id.clone(),
                    doctor_id: self.doctor_id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::AcceptAppointment { actor } => {
                self.validate_existing()?;
                self.validate_doctor(&actor)?;
                self.require_pending("accept")?;

                Ok(vec![Event::AppointmentAccepted {
                    id: self.id.clone(),
                    patient_id: self.patient_id.clone(),
                    doctor_id: self.doctor_id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::RejectAppointment { actor, reason } => {
                self.validate_existing()?;
                self.validate_doctor(&actor)?;
                self.require_pending("reject")?;

                Ok(vec![Event::AppointmentRejected {
                    id: self.id.clone(),
                    patient_id: self.patient_id.clone(),
                    doctor_id: self.doctor_id.clone(),
                    reason,
                    updated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::AppointmentBooked {
                id,
                patient_id,
                patient_name,
                doctor_id,
                appointment_date,
                time_slot,
                reason,
                created_at,
            } => {
                self.id = id;
                self.patient_id = patient_id;
                self.patient_name = patient_name;
                self.doctor_id = doctor_id;
                self.appointment_date = appointment_date;
                self.time_slot = time_slot;
                self.reason = reason;
                self.status = AppointmentStatus::Pending;
                self.created_at = created_at;
                self.updated_at = created_at;
            }

            Event::AppointmentCancelled { updated_at, .. } => {
                self.status = AppointmentStatus::Cancelled;
                self.updated_at = updated_at;
            }

            Event::AppointmentAccepted { updated_at, .. } => {
                self.status = AppointmentStatus::Accepted;
                self.updated_at = updated_at;
            }

            Event::AppointmentRejected {
                reason, updated_at, ..
            } => {
                self.status = AppointmentStatus::Rejected;
                self.rejection_reason = reason;
                self.updated_at = updated_at;
            }
        }
    }
}

impl Appointment {
    pub fn visible_to(&self, identity: &Identity) -> bool {
        match identity.role {
            Role::Patient => self.patient_id == identity.user_id,
            Role::Doctor => self.doctor_id == identity.user_id,
            Role::Admin => true,
            Role::Pharmacist => false,
        }
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::not_found("Appointment", ""));
        }
        Ok(())
    }

    fn validate_doctor(&self, actor: &Identity) -> Result<(), Error> {
        if actor.role != Role::Doctor || actor.user_id != self.doctor_id {
            return Err(Error::forbidden("appointment is with another doctor"));
        }
        Ok(())
    }

    fn require_pending(&self, action: &str) -> Result<(), Error> {
        if self.status != AppointmentStatus::Pending {
            return Err(self.invalid_state(action, "Pending"));
        }
        Ok(())
    }

    fn invalid_state(&self, action: &str, expected: &str) -> Error {
        Error::InvalidState {
            entity: "Appointment".to_string(),
            action: action.to_string(),
            expected: expected.to_string(),
            actual: self.status.to_string(),
        }
    }
}
