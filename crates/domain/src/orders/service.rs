use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use super::{
    inputs::{ApproveOrderInput, PaymentInput, RejectOrderInput, UploadPrescriptionInput},
    Command, OrderStatus, PharmacistOrderSummary, PrescriptionOrder, View,
};
use crate::{
    accounts::{AccountStore, Identity, Role},
    bus::{command_metadata, CommandBus},
    catalog::{CatalogStore, StockReservations},
    deliveries::{DeliveryPackage, DeliveryStore},
    errors::Error,
    store::ViewStore,
};

/// `ORD-<epoch millis>-<9 random uppercase alphanumerics>`
pub fn order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchedOrder {
    pub order: PrescriptionOrder,
    pub package: DeliveryPackage,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PharmacistStats {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub awaiting_payment_orders: usize,
    pub paid_orders: usize,
    pub processing_orders: usize,
    pub ready_for_dispatch_orders: usize,
    pub completed_orders: usize,
    pub rejected_orders: usize,
    pub total_medicines: usize,
    pub out_of_stock_medicines: usize,
    pub expiring_soon_medicines: usize,
}

#[derive(Clone)]
pub struct OrderService {
    cqrs: Arc<dyn CommandBus<PrescriptionOrder>>,
    repo: Arc<dyn ViewStore<View, PrescriptionOrder>>,
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn CatalogStore>,
    deliveries: Arc<dyn DeliveryStore>,
    reservations: StockReservations,
}

impl OrderService {
    /// `reservations` must be the ones handed to the aggregate's `Services`.
    pub fn new(
        cqrs: Arc<dyn CommandBus<PrescriptionOrder>>,
        repo: Arc<dyn ViewStore<View, PrescriptionOrder>>,
        accounts: Arc<dyn AccountStore>,
        catalog: Arc<dyn CatalogStore>,
        deliveries: Arc<dyn DeliveryStore>,
        reservations: StockReservations,
    ) -> Self {
        Self {
            cqrs,
            repo,
            accounts,
            catalog,
            deliveries,
            reservations,
        }
    }

    pub async fn submit(
        &self,
        actor: &Identity,
        input: UploadPrescriptionInput,
    ) -> Result<PrescriptionOrder, Error> {
        let id = ulid::Ulid::new().to_string();
        let command = Command::SubmitPrescription {
            id: id.clone(),
            order_number: order_number(),
            actor: actor.clone(),
            prescription_reference: input.prescription_file,
            doctor_id: input.doctor_id,
        };
        self.execute(actor, &id, command).await?;
        tracing::info!(order_id = %id, patient_id = %actor.user_id, "Prescription uploaded");
        self.load(&id).await
    }

    pub async fn approve(
        &self,
        actor: &Identity,
        id: &str,
        input: ApproveOrderInput,
    ) -> Result<PrescriptionOrder, Error> {
        let reservation_id = ulid::Ulid::new().to_string();
        let command = Command::ApproveOrder {
            actor: actor.clone(),
            medicines: input.medicines,
            pharmacist_notes: input.pharmacist_notes,
            reservation_id: reservation_id.clone(),
        };

        let result = self
            .cqrs
            .execute_with_metadata(id, command, command_metadata(&actor.user_id))
            .await;
        // Stock taken while handling must go back unless the events were committed.
        let taken = self.reservations.release(&reservation_id);
        if let Err(err) = result {
            if let Some(taken) = taken {
                if let Err(restock_err) = self.catalog.restock(&taken).await {
                    tracing::error!(order_id = %id, "Failed to restock after failed approval: {}", restock_err);
                } else {
                    tracing::warn!(order_id = %id, "Approval not committed, stock returned");
                }
            }
            return Err(scoped(Error::from_aggregate("Order", err), id));
        }

        tracing::info!(order_id = %id, pharmacist_id = %actor.user_id, "Order approved");
        self.load(id).await
    }

    pub async fn reject(
        &self,
        actor: &Identity,
        id: &str,
        input: RejectOrderInput,
    ) -> Result<PrescriptionOrder, Error> {
        let command = Command::RejectOrder {
            actor: actor.clone(),
            rejection_reason: input.rejection_reason,
        };
        self.execute(actor, id, command).await?;
        tracing::info!(order_id = %id, pharmacist_id = %actor.user_id, "Order rejected");
        self.load(id).await
    }

    pub async fn pay(
        &self,
        actor: &Identity,
        id: &str,
        input: PaymentInput,
    ) -> Result<PrescriptionOrder, Error> {
        let command = Command::PayOrder {
            actor: actor.clone(),
            payment_method: input.payment_method,
            transaction_id: input.transaction_id,
        };
        self.execute(actor, id, command).await?;
        tracing::info!(order_id = %id, "Order paid");
        self.load(id).await
    }

    pub async fn start_processing(&self, actor: &Identity, id: &str) -> Result<PrescriptionOrder, Error> {
        let command = Command::StartProcessing {
            actor: actor.clone(),
        };
        self.execute(actor, id, command).await?;
        tracing::info!(order_id = %id, "Order processing started");
        self.load(id).await
    }

    pub async fn mark_ready_for_dispatch(
        &self,
        actor: &Identity,
        id: &str,
    ) -> Result<DispatchedOrder, Error> {
        let command = Command::MarkReadyForDispatch {
            actor: actor.clone(),
        };
        self.execute(actor, id, command).await?;
        tracing::info!(order_id = %id, "Order ready for dispatch");

        let order = self.load(id).await?;
        let package = self
            .deliveries
            .find_by_order(id)
            .await?
            .ok_or_else(|| Error::not_found("Delivery package", id))?;
        Ok(DispatchedOrder { order, package })
    }

    pub async fn complete(&self, actor: &Identity, id: &str) -> Result<PrescriptionOrder, Error> {
        let command = Command::CompleteOrder {
            actor: actor.clone(),
        };
        self.execute(actor, id, command).await?;
        tracing::info!(order_id = %id, "Order completed");
        self.load(id).await
    }

    pub async fn get(&self, actor: &Identity, id: &str) -> Result<PrescriptionOrder, Error> {
        let order = self.load(id).await?;
        if !order.visible_to(actor) {
            return Err(Error::forbidden("access denied"));
        }
        Ok(order)
    }

    /// Orders waiting for review, newest first, without delivery addresses.
    pub async fn pending(&self, actor: &Identity) -> Result<Vec<PharmacistOrderSummary>, Error> {
        actor.require(Role::Pharmacist)?;
        self.summaries(|order| order.status == OrderStatus::PendingReview)
            .await
    }

    pub async fn all(&self, actor: &Identity) -> Result<Vec<PharmacistOrderSummary>, Error> {
        actor.require(Role::Pharmacist)?;
        self.summaries(|_| true).await
    }

    pub async fn mine(&self, actor: &Identity) -> Result<Vec<PrescriptionOrder>, Error> {
        actor.require(Role::Patient)?;
        let mut orders: Vec<PrescriptionOrder> = self
            .orders()
            .await?
            .into_iter()
            .filter(|order| order.patient_id == actor.user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn stats(&self, actor: &Identity) -> Result<PharmacistStats, Error> {
        actor.require_inventory_manager()?;
        let mut stats = PharmacistStats::default();

        for order in self.orders().await? {
            stats.total_orders += 1;
            let counter = match order.status {
                OrderStatus::PendingReview => &mut stats.pending_orders,
                OrderStatus::AwaitingPayment => &mut stats.awaiting_payment_orders,
                OrderStatus::Paid => &mut stats.paid_orders,
                OrderStatus::Processing => &mut stats.processing_orders,
                OrderStatus::ReadyForDispatch => &mut stats.ready_for_dispatch_orders,
                OrderStatus::Completed => &mut stats.completed_orders,
                OrderStatus::Rejected => &mut stats.rejected_orders,
            };
            *counter += 1;
        }

        let horizon = (Utc::now() + Duration::days(30)).date_naive();
        for medicine in self.catalog.list().await? {
            stats.total_medicines += 1;
            if medicine.stock == 0 {
                stats.out_of_stock_medicines += 1;
            } else if medicine.expiry_date.is_some_and(|expiry| expiry < horizon) {
                stats.expiring_soon_medicines += 1;
            }
        }
        Ok(stats)
    }

    async fn summaries(
        &self,
        keep: impl Fn(&PrescriptionOrder) -> bool,
    ) -> Result<Vec<PharmacistOrderSummary>, Error> {
        let mut orders: Vec<PrescriptionOrder> =
            self.orders().await?.into_iter().filter(|o| keep(o)).collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut summaries = Vec::with_capacity(orders.len());
        for order in &orders {
            let patient_name = self
                .accounts
                .get(&order.patient_id)
                .await?
                .map(|account| account.name)
                .unwrap_or_else(|| "Unknown Patient".to_string());
            summaries.push(PharmacistOrderSummary::new(order, patient_name));
        }
        Ok(summaries)
    }

    async fn orders(&self) -> Result<Vec<PrescriptionOrder>, Error> {
        Ok(self.repo.list().await?.into_iter().map(|view| view.order).collect())
    }

    async fn execute(&self, actor: &Identity, id: &str, command: Command) -> Result<(), Error> {
        self.cqrs
            .execute_with_metadata(id, command, command_metadata(&actor.user_id))
            .await
            .map_err(|err| scoped(Error::from_aggregate("Order", err), id))
    }

    async fn load(&self, id: &str) -> Result<PrescriptionOrder, Error> {
        self.repo
            .load(id)
            .await?
            .map(|view| view.order)
            .ok_or_else(|| Error::not_found("Order", id))
    }
}

// The aggregate does not know its own id before it exists.
fn scoped(err: Error, id: &str) -> Error {
    match err {
        Error::NotFound { entity, id: missing } if missing.is_empty() => Error::NotFound {
            entity,
            id: id.to_string(),
        },
        other => other,
    }
}
