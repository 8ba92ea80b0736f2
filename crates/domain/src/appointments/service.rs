use std::sync::Arc;

use super::{inputs::BookAppointmentInput, Appointment, Command, View};
use crate::{
    accounts::{Identity, Role},
    bus::{command_metadata, CommandBus},
    errors::Error,
    store::ViewStore,
};

#[derive(Clone)]
pub struct AppointmentService {
    cqrs: Arc<dyn CommandBus<Appointment>>,
    repo: Arc<dyn ViewStore<View, Appointment>>,
}

impl AppointmentService {
    pub fn new(
        cqrs: Arc<dyn CommandBus<Appointment>>,
        repo: Arc<dyn ViewStore<View, Appointment>>,
    ) -> Self {
        Self { cqrs, repo }
    }

    pub async fn book(&self, actor: &Identity, input: BookAppointmentInput) -> Result<View, Error> {
        let id = ulid::Ulid::new().to_string();
        let command = Command::BookAppointment {
            id: id.clone(),
            actor: actor.clone(),
            doctor_id: input.doctor_id,
            appointment_date: input.appointment_date,
            time_slot: input.time_slot,
            reason: input.reason,
        };
        self.execute(actor, &id, command).await?;
        tracing::info!(appointment_id = %id, patient_id = %actor.user_id, "Appointment booked");
        self.load(&id).await
    }

    pub async fn cancel(&self, actor: &Identity, id: &str) -> Result<View, Error> {
        let command = Command::CancelAppointment {
            actor: actor.clone(),
        };
        self.execute(actor, id, command).await?;
        self.load(id).await
    }

    pub async fn accept(&self, actor: &Identity, id: &str) -> Result<View, Error> {
        let command = Command::AcceptAppointment {
            actor: actor.clone(),
        };
        self.execute(actor, id, command).await?;
        self.load(id).await
    }

    pub async fn reject(
        &self,
        actor: &Identity,
        id: &str,
        reason: Option<String>,
    ) -> Result<View, Error> {
        let command = Command::RejectAppointment {
            actor: actor.clone(),
            reason,
        };
        self.execute(actor, id, command).await?;
        self.load(id).await
    }

    pub async fn get(&self, actor: &Identity, id: &str) -> Result<View, Error> {
        let view = self.load(id).await?;
        if !view.appointment.visible_to(actor) {
            return Err(Error::forbidden("not a participant of this appointment"));
        }
        Ok(view)
    }

    /// Patients see their bookings, doctors their schedule, admins everything.
    pub async fn list(&self, actor: &Identity) -> Result<Vec<View>, Error> {
        if actor.role == Role::Pharmacist {
            return Err(Error::forbidden("pharmacists do not manage appointments"));
        }
        let mut views: Vec<View> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|view| view.appointment.visible_to(actor))
            .collect();
        views.sort_by(|a, b| a.appointment.appointment_date.cmp(&b.appointment.appointment_date));
        Ok(views)
    }

    async fn execute(&self, actor: &Identity, id: &str, command: Command) -> Result<(), Error> {
        self.cqrs
            .execute_with_metadata(id, command, command_metadata(&actor.user_id))
            .await
            .map_err(|err| match Error::from_aggregate("Appointment", err) {
                Error::NotFound { entity, id: missing } if missing.is_empty() => {
                    Error::NotFound { entity, id: id.to_string() }
                }
                other => other,
            })
    }

    async fn load(&self, id: &str) -> Result<View, Error> {
        self.repo
            .load(id)
            .await?
            .ok_or_else(|| Error::not_found("Appointment", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accounts::{Account, AccountStore},
        appointments::{cqrs, AppointmentStatus, Services},
        bus::EventBackend,
        store::memory::{MemoryAccountStore, MemoryViewStore},
    };
    use chrono::Utc;

    async fn service() -> AppointmentService {
        let accounts = Arc::new(MemoryAccountStore::default());
        for (id, role) in [("p1", Role::Patient), ("d1", Role::Doctor)] {
            accounts
                .put(&Account {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    email: format!("{id}@example.com"),
                    phone: String::new(),
                    role,
                    address: None,
                    specialization: None,
                    credential_hash: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let repo: Arc<MemoryViewStore<View>> = Arc::new(MemoryViewStore::default());
        let bus = cqrs::init(&EventBackend::Memory, repo.clone(), vec![], Services::new(accounts));
        AppointmentService::new(bus, repo)
    }

    fn input() -> BookAppointmentInput {
        BookAppointmentInput {
            doctor_id: "d1".to_string(),
            appointment_date: Utc::now(),
            time_slot: "09:00 - 09:30".to_string(),
            reason: None,
        }
    }

    #[tokio::test]
    async fn book_then_accept_is_visible_to_both_parties() {
        let service = service().await;
        let patient = Identity::new("p1", Role::Patient);
        let doctor = Identity::new("d1", Role::Doctor);

        let booked = service.book(&patient, input()).await.unwrap();
        let accepted = service.accept(&doctor, &booked.id).await.unwrap();
        assert_eq!(accepted.appointment.status, AppointmentStatus::Accepted);

        assert_eq!(service.list(&patient).await.unwrap().len(), 1);
        assert_eq!(service.list(&doctor).await.unwrap().len(), 1);
        assert!(service
            .list(&Identity::new("d2", Role::Doctor))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_appointment_reports_its_id() {
        let service = service().await;
        let err = service
            .accept(&Identity::new("d1", Role::Doctor), "missing")
            .await
            .unwrap_err();
        assert_eq!(err, Error::not_found("Appointment", "missing"));
    }
}
