use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountStore, Identity, Role},
    appointments::{Appointment, Event as AppointmentEvent},
    errors::Error,
    notifications::{NotificationGateway, NotificationKind, Outgoing},
    orders::{Event as OrderEvent, PrescriptionOrder},
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    #[default]
    New,
    Pending,
    Accepted,
    Rejected,
}

/// Doctor-patient association, unique per `(doctor_id, patient_id)`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPatient {
    pub doctor_id: String,
    pub patient_id: String,
    pub status: RelationshipStatus,
    pub last_visit: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorPatient {
    pub fn key(&self) -> String {
        pair_key(&self.doctor_id, &self.patient_id)
    }
}

pub fn pair_key(doctor_id: &str, patient_id: &str) -> String {
    format!("{doctor_id}#{patient_id}")
}

/// Applies one booking/prescription interaction to the pair's record.
///
/// `last_visit` only moves forward. A rejected relationship is reopened as
/// `new`; every other status is kept.
pub fn record_interaction(
    existing: Option<DoctorPatient>,
    doctor_id: &str,
    patient_id: &str,
    at: DateTime<Utc>,
) -> DoctorPatient {
    let now = Utc::now();
    match existing {
        None => DoctorPatient {
            doctor_id: doctor_id.to_string(),
            patient_id: patient_id.to_string(),
            status: RelationshipStatus::New,
            last_visit: Some(at),
            created_at: now,
            updated_at: now,
        },
        Some(mut relation) => {
            relation.last_visit = Some(relation.last_visit.map_or(at, |last| last.max(at)));
            if relation.status == RelationshipStatus::Rejected {
                relation.status = RelationshipStatus::New;
            }
            relation.updated_at = now;
            relation
        }
    }
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn get(&self, doctor_id: &str, patient_id: &str) -> Result<Option<DoctorPatient>, Error>;
    async fn put(&self, relation: &DoctorPatient) -> Result<(), Error>;
    async fn list_for_doctor(&self, doctor_id: &str) -> Result<Vec<DoctorPatient>, Error>;
    async fn list_for_patient(&self, patient_id: &str) -> Result<Vec<DoctorPatient>, Error>;
    async fn delete(&self, doctor_id: &str, patient_id: &str) -> Result<(), Error>;
}

pub async fn touch(
    store: &dyn RelationshipStore,
    doctor_id: &str,
    patient_id: &str,
    at: DateTime<Utc>,
) -> Result<DoctorPatient, Error> {
    let existing = store.get(doctor_id, patient_id).await?;
    let relation = record_interaction(existing, doctor_id, patient_id, at);
    store.put(&relation).await?;
    tracing::info!(
        doctor_id = %doctor_id,
        patient_id = %patient_id,
        status = ?relation.status,
        "Doctor-patient relationship touched"
    );
    Ok(relation)
}

pub async fn set_status(
    store: &dyn RelationshipStore,
    doctor_id: &str,
    patient_id: &str,
    status: RelationshipStatus,
) -> Result<DoctorPatient, Error> {
    let mut relation = store
        .get(doctor_id, patient_id)
        .await?
        .ok_or_else(|| Error::not_found("Patient relationship", pair_key(doctor_id, patient_id)))?;
    relation.status = status;
    relation.updated_at = Utc::now();
    store.put(&relation).await?;
    Ok(relation)
}

/// Removes every relationship the account takes part in, on either side.
pub async fn delete_for_account(store: &dyn RelationshipStore, account_id: &str) -> Result<usize, Error> {
    let mut removed = 0;
    let as_doctor = store.list_for_doctor(account_id).await?;
    let as_patient = store.list_for_patient(account_id).await?;
    for relation in as_doctor.iter().chain(as_patient.iter()) {
        store.delete(&relation.doctor_id, &relation.patient_id).await?;
        removed += 1;
    }
    Ok(removed)
}

/// A doctor's patient list entry.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientEntry {
    #[serde(flatten)]
    pub relationship: DoctorPatient,
    pub patient_name: String,
    pub patient_email: String,
}

/// The doctor's patients, most recent visit first.
pub async fn patients_of(
    store: &dyn RelationshipStore,
    accounts: &dyn AccountStore,
    actor: &Identity,
) -> Result<Vec<PatientEntry>, Error> {
    actor.require(Role::Doctor)?;
    let mut relations = store.list_for_doctor(&actor.user_id).await?;
    relations.sort_by(|a, b| b.last_visit.cmp(&a.last_visit));

    let mut entries = Vec::with_capacity(relations.len());
    for relationship in relations {
        let (patient_name, patient_email) = match accounts.get(&relationship.patient_id).await? {
            Some(account) => (account.name, account.email),
            None => ("Unknown Patient".to_string(), String::new()),
        };
        entries.push(PatientEntry {
            relationship,
            patient_name,
            patient_email,
        });
    }
    Ok(entries)
}

/// Doctor accepts or rejects a patient; the patient is told either way.
pub async fn respond(
    store: &dyn RelationshipStore,
    gateway: &NotificationGateway,
    actor: &Identity,
    patient_id: &str,
    accept: bool,
) -> Result<DoctorPatient, Error> {
    actor.require(Role::Doctor)?;
    let status = if accept {
        RelationshipStatus::Accepted
    } else {
        RelationshipStatus::Rejected
    };
    let relation = set_status(store, &actor.user_id, patient_id, status).await?;
    tracing::info!(doctor_id = %actor.user_id, patient_id = %patient_id, status = ?status, "Patient reviewed");

    let outgoing = if accept {
        Outgoing::new(
            patient_id.to_string(),
            "Doctor Accepted".to_string(),
            "Your doctor has accepted you as a patient.".to_string(),
            NotificationKind::Success,
            Some(actor.user_id.clone()),
            true,
        )
    } else {
        Outgoing::new(
            patient_id.to_string(),
            "Doctor Unavailable".to_string(),
            "Your doctor is unable to take you on as a patient.".to_string(),
            NotificationKind::Warning,
            Some(actor.user_id.clone()),
            true,
        )
    };
    gateway.dispatch(outgoing).await;
    Ok(relation)
}

/// Keeps doctor-patient records current as bookings and prescriptions come in.
pub struct RelationshipQuery {
    store: Arc<dyn RelationshipStore>,
}

impl RelationshipQuery {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self { store }
    }

    async fn record(&self, doctor_id: &str, patient_id: &str, at: DateTime<Utc>) {
        if let Err(err) = touch(self.store.as_ref(), doctor_id, patient_id, at).await {
            tracing::error!(
                doctor_id = %doctor_id,
                patient_id = %patient_id,
                "Failed to update relationship: {}",
                err
            );
        }
    }
}

#[async_trait]
impl cqrs_es::Query<Appointment> for RelationshipQuery {
    async fn dispatch(&self, _appointment_id: &str, events: &[EventEnvelope<Appointment>]) {
        for event in events {
            if let AppointmentEvent::AppointmentBooked {
                patient_id,
                doctor_id,
                appointment_date,
                ..
            } = &event.payload
            {
                self.record(doctor_id, patient_id, *appointment_date).await;
            }
        }
    }
}

#[async_trait]
impl cqrs_es::Query<PrescriptionOrder> for RelationshipQuery {
    async fn dispatch(&self, _order_id: &str, events: &[EventEnvelope<PrescriptionOrder>]) {
        for event in events {
            if let OrderEvent::PrescriptionSubmitted {
                patient_id,
                doctor_id: Some(doctor_id),
                created_at,
                ..
            } = &event.payload
            {
                self.record(doctor_id, patient_id, *created_at).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRelationshipStore;
    use chrono::Duration;

    #[test]
    fn first_interaction_creates_new_relationship() {
        let at = Utc::now();
        let relation = record_interaction(None, "d1", "p1", at);
        assert_eq!(relation.status, RelationshipStatus::New);
        assert_eq!(relation.last_visit, Some(at));
    }

    #[test]
    fn last_visit_never_moves_backward() {
        let later = Utc::now();
        let earlier = later - Duration::days(3);
        let relation = record_interaction(None, "d1", "p1", later);
        let relation = record_interaction(Some(relation), "d1", "p1", earlier);
        assert_eq!(relation.last_visit, Some(later));

        let latest = later + Duration::days(1);
        let relation = record_interaction(Some(relation), "d1", "p1", latest);
        assert_eq!(relation.last_visit, Some(latest));
    }

    #[test]
    fn rejected_reopens_but_accepted_stays() {
        let at = Utc::now();
        let mut rejected = record_interaction(None, "d1", "p1", at);
        rejected.status = RelationshipStatus::Rejected;
        assert_eq!(
            record_interaction(Some(rejected), "d1", "p1", at).status,
            RelationshipStatus::New
        );

        let mut accepted = record_interaction(None, "d1", "p1", at);
        accepted.status = RelationshipStatus::Accepted;
        assert_eq!(
            record_interaction(Some(accepted), "d1", "p1", at).status,
            RelationshipStatus::Accepted
        );
    }

    #[tokio::test]
    async fn set_status_on_unknown_pair_is_not_found() {
        let store = MemoryRelationshipStore::default();
        let err = set_status(&store, "d1", "p1", RelationshipStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_for_account_cascades_both_sides() {
        let store = MemoryRelationshipStore::default();
        let at = Utc::now();
        touch(&store, "d1", "p1", at).await.unwrap();
        touch(&store, "d2", "p1", at).await.unwrap();
        touch(&store, "d1", "p2", at).await.unwrap();

        assert_eq!(delete_for_account(&store, "p1").await.unwrap(), 2);
        assert!(store.list_for_patient("p1").await.unwrap().is_empty());
        assert_eq!(store.list_for_doctor("d1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prescriptions_touch_only_when_a_doctor_is_named() {
        use cqrs_es::Query;
        use std::collections::HashMap;

        let store = Arc::new(MemoryRelationshipStore::default());
        let query = RelationshipQuery::new(store.clone());
        let submitted = |doctor_id: Option<&str>| EventEnvelope::<PrescriptionOrder> {
            aggregate_id: "o1".to_string(),
            sequence: 1,
            payload: OrderEvent::PrescriptionSubmitted {
                id: "o1".to_string(),
                order_number: "ORD-1".to_string(),
                patient_id: "p1".to_string(),
                doctor_id: doctor_id.map(str::to_string),
                prescription_reference: "rx1.png".to_string(),
                delivery_address: Default::default(),
                created_at: Utc::now(),
            },
            metadata: HashMap::new(),
        };

        Query::<PrescriptionOrder>::dispatch(&query, "o1", &[submitted(None)]).await;
        assert!(store.list_for_patient("p1").await.unwrap().is_empty());

        Query::<PrescriptionOrder>::dispatch(&query, "o1", &[submitted(Some("d1"))]).await;
        let relation = store.get("d1", "p1").await.unwrap().unwrap();
        assert_eq!(relation.status, RelationshipStatus::New);
    }
}
