use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{Address, Identity},
    errors::Error,
    orders::{Event as OrderEvent, PrescriptionOrder},
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
}

impl DeliveryStatus {
    fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Assigned => 1,
            DeliveryStatus::PickedUp => 2,
            DeliveryStatus::InTransit => 3,
            DeliveryStatus::Delivered => 4,
        }
    }

    /// Packages move one step at a time along the delivery chain.
    pub fn can_advance_to(&self, next: DeliveryStatus) -> bool {
        next.rank() == self.rank() + 1
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientContact {
    pub name: String,
    pub phone: String,
}

/// Dispatch-facing copy of an order, frozen when the order became ready for dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPackage {
    pub id: String,
    pub tracking_id: String,
    pub order_id: String,
    pub order_number: String,
    pub patient: PatientContact,
    pub delivery_address: Address,
    pub status: DeliveryStatus,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryPackage {
    pub fn snapshot(
        order_id: &str,
        order_number: &str,
        patient: PatientContact,
        delivery_address: Address,
        at: DateTime<Utc>,
    ) -> Self {
        let id = ulid::Ulid::new().to_string();
        Self {
            tracking_id: format!("TRK-{id}"),
            id,
            order_id: order_id.to_string(),
            order_number: order_number.to_string(),
            patient,
            delivery_address,
            status: DeliveryStatus::Pending,
            assigned_to: None,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceDeliveryInput {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Stores the package unless one already exists for its order; returns whether it was written.
    async fn insert_if_absent(&self, package: &DeliveryPackage) -> Result<bool, Error>;
    async fn get(&self, id: &str) -> Result<Option<DeliveryPackage>, Error>;
    async fn find_by_order(&self, order_id: &str) -> Result<Option<DeliveryPackage>, Error>;
    async fn list(&self) -> Result<Vec<DeliveryPackage>, Error>;
    async fn put(&self, package: &DeliveryPackage) -> Result<(), Error>;
}

pub async fn list(store: &dyn DeliveryStore, actor: &Identity) -> Result<Vec<DeliveryPackage>, Error> {
    actor.require_inventory_manager()?;
    let mut packages = store.list().await?;
    packages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(packages)
}

pub async fn advance(
    store: &dyn DeliveryStore,
    actor: &Identity,
    id: &str,
    input: AdvanceDeliveryInput,
) -> Result<DeliveryPackage, Error> {
    actor.require_inventory_manager()?;
    let mut package = store
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("Delivery package", id))?;

    if !package.status.can_advance_to(input.status) {
        return Err(Error::InvalidState {
            entity: "Delivery package".to_string(),
            action: format!("move to {:?}", input.status),
            expected: "the next delivery step".to_string(),
            actual: format!("{:?}", package.status),
        });
    }
    if input.status == DeliveryStatus::Assigned {
        let assignee = input
            .assigned_to
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| Error::validation("assignedTo is required to assign a package"))?;
        package.assigned_to = Some(assignee);
    }
    package.status = input.status;
    package.updated_at = Utc::now();
    store.put(&package).await?;

    tracing::info!(package_id = %package.id, status = ?package.status, "Delivery package advanced");
    Ok(package)
}

/// Replays `ReadyForDispatch` packages into the store. The command handler
/// normally wrote them already, so a duplicate is expected.
pub struct DeliveryQuery {
    store: Arc<dyn DeliveryStore>,
}

impl DeliveryQuery {
    pub fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl cqrs_es::Query<PrescriptionOrder> for DeliveryQuery {
    async fn dispatch(&self, order_id: &str, events: &[EventEnvelope<PrescriptionOrder>]) {
        for event in events {
            if let OrderEvent::ReadyForDispatch { package, .. } = &event.payload {
                match self.store.insert_if_absent(package).await {
                    Ok(true) => tracing::info!(
                        order_id = %order_id,
                        package_id = %package.id,
                        "Delivery package created"
                    ),
                    Ok(false) => tracing::debug!(order_id = %order_id, "Delivery package already stored"),
                    Err(err) => tracing::error!(
                        order_id = %order_id,
                        "Failed to store delivery package: {}",
                        err
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accounts::Role, store::memory::MemoryDeliveryStore};

    fn package() -> DeliveryPackage {
        DeliveryPackage::snapshot(
            "o1",
            "ORD-1",
            PatientContact {
                name: "Ravi".to_string(),
                phone: "555".to_string(),
            },
            Address::default(),
            Utc::now(),
        )
    }

    fn pharmacist() -> Identity {
        Identity::new("ph", Role::Pharmacist)
    }

    fn step(status: DeliveryStatus, assigned_to: Option<&str>) -> AdvanceDeliveryInput {
        AdvanceDeliveryInput {
            status,
            assigned_to: assigned_to.map(str::to_string),
        }
    }

    #[test]
    fn status_moves_one_step_forward_only() {
        assert!(DeliveryStatus::Pending.can_advance_to(DeliveryStatus::Assigned));
        assert!(DeliveryStatus::InTransit.can_advance_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Pending.can_advance_to(DeliveryStatus::InTransit));
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::InTransit));
        assert!(!DeliveryStatus::Assigned.can_advance_to(DeliveryStatus::Assigned));
    }

    #[tokio::test]
    async fn insert_is_once_per_order() {
        let store = MemoryDeliveryStore::default();
        assert!(store.insert_if_absent(&package()).await.unwrap());
        assert!(!store.insert_if_absent(&package()).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advance_walks_the_chain() {
        let store = MemoryDeliveryStore::default();
        let pkg = package();
        store.insert_if_absent(&pkg).await.unwrap();

        let err = advance(&store, &pharmacist(), &pkg.id, step(DeliveryStatus::Assigned, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let assigned = advance(
            &store,
            &pharmacist(),
            &pkg.id,
            step(DeliveryStatus::Assigned, Some("rider-7")),
        )
        .await
        .unwrap();
        assert_eq!(assigned.assigned_to.as_deref(), Some("rider-7"));

        let err = advance(&store, &pharmacist(), &pkg.id, step(DeliveryStatus::Delivered, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        for next in [
            DeliveryStatus::PickedUp,
            DeliveryStatus::InTransit,
            DeliveryStatus::Delivered,
        ] {
            let pkg = advance(&store, &pharmacist(), &pkg.id, step(next, None))
                .await
                .unwrap();
            assert_eq!(pkg.status, next);
        }
    }

    #[tokio::test]
    async fn patients_cannot_manage_packages() {
        let store = MemoryDeliveryStore::default();
        let err = list(&store, &Identity::new("p", Role::Patient)).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }
}
