use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountStore, Address, Identity, Role},
    catalog::{CatalogStore, StockReservations},
    deliveries::{DeliveryPackage, DeliveryStore, PatientContact},
    errors::Error,
};

use super::{pricing, Command, Event};

/// Prescription order workflow status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum OrderStatus {
    /// Prescription uploaded, waiting for a pharmacist
    #[default]
    #[serde(rename = "Pending Review")]
    PendingReview,
    /// Priced by a pharmacist, waiting for the patient to pay
    #[serde(rename = "Approved - Awaiting Payment")]
    AwaitingPayment,
    Paid,
    Processing,
    #[serde(rename = "Ready for Dispatch")]
    ReadyForDispatch,
    Completed,
    /// Terminal, reachable only from `PendingReview`
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingReview,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::ReadyForDispatch,
        OrderStatus::Completed,
        OrderStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingReview => "Pending Review",
            OrderStatus::AwaitingPayment => "Approved - Awaiting Payment",
            OrderStatus::Paid => "Paid",
            OrderStatus::Processing => "Processing",
            OrderStatus::ReadyForDispatch => "Ready for Dispatch",
            OrderStatus::Completed => "Completed",
            OrderStatus::Rejected => "Rejected",
        }
    }

    /// True once a delivery package has been materialized for the order.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, OrderStatus::ReadyForDispatch | OrderStatus::Completed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub medicine_id: String,
    pub name: String,
    pub quantity: u32,
    /// Minor currency units.
    pub unit_price: u64,
}

impl LineItem {
    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payment_method: String,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

/// Prescription order aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionOrder {
    pub id: String,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: OrderStatus,

    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub prescription_reference: String,
    pub delivery_address: Address,

    // Set at approval
    pub line_items: Vec<LineItem>,
    pub total_amount: u64,
    pub reviewed_by: Option<String>,
    pub pharmacist_notes: Option<String>,
    pub rejection_reason: Option<String>,

    pub payment_status: PaymentStatus,
    pub payment: Option<PaymentDetails>,

    pub delivery_package_id: Option<String>,
}

pub const AGGREGATE_TYPE: &str = "PrescriptionOrder";

#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub reservations: StockReservations,
}

impl Services {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        catalog: Arc<dyn CatalogStore>,
        deliveries: Arc<dyn DeliveryStore>,
        reservations: StockReservations,
    ) -> Self {
        Self {
            accounts,
            catalog,
            deliveries,
            reservations,
        }
    }
}

#[async_trait]
impl Aggregate for PrescriptionOrder {
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
            Command::SubmitPrescription {
                id,
                order_number,
                actor,
                prescription_reference,
                doctor_id,
            } => {
                self.validate_new(&id)?;
                actor.require(Role::Patient)?;
                let prescription_reference = prescription_reference.trim().to_string();
                if prescription_reference.is_empty() {
                    return Err(Error::validation("prescriptionFile is required"));
                }
                let patient = services
                    .accounts
                    .get(&actor.user_id)
                    .await?
                    .ok_or_else(|| Error::not_found("Patient", actor.user_id.as_str()))?;

                Ok(vec![Event::PrescriptionSubmitted {
                    id,
                    order_number,
                    patient_id: patient.id,
                    doctor_id: doctor_id.filter(|d| !d.trim().is_empty()),
                    prescription_reference,
                    delivery_address: patient.address.unwrap_or_default(),
                    created_at: Utc::now(),
                }])
            }

            Command::ApproveOrder {
                actor,
                medicines,
                pharmacist_notes,
                reservation_id,
            } => {
                self.validate_existing()?;
                actor.require(Role::Pharmacist)?;
                self.require_status("approve", OrderStatus::PendingReview)?;

                let priced = pricing::price_line_items(services.catalog.as_ref(), &medicines).await?;
                services.catalog.take_stock(&priced.stock_requests).await?;
                services
                    .reservations
                    .hold(&reservation_id, priced.stock_requests);

                Ok(vec![Event::OrderApproved {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    line_items: priced.line_items,
                    total_amount: priced.total_amount,
                    reviewed_by: actor.user_id,
                    pharmacist_notes,
                    updated_at: Utc::now(),
                }])
            }

            Command::RejectOrder {
                actor,
                rejection_reason,
            } => {
                self.validate_existing()?;
                actor.require(Role::Pharmacist)?;
                self.require_status("reject", OrderStatus::PendingReview)?;

                Ok(vec![Event::OrderRejected {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    reviewed_by: actor.user_id,
                    rejection_reason,
                    updated_at: Utc::now(),
                }])
            }

            Command::PayOrder {
                actor,
                payment_method,
                transaction_id,
            } => {
                self.validate_existing()?;
                self.validate_owner(&actor)?;
                self.require_status("pay", OrderStatus::AwaitingPayment)?;
                if transaction_id.trim().is_empty() {
                    return Err(Error::validation("transactionId is required"));
                }

                Ok(vec![Event::OrderPaid {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    payment_method,
                    transaction_id,
                    updated_at: Utc::now(),
                }])
            }

            Command::StartProcessing { actor } => {
                self.validate_existing()?;
                actor.require(Role::Pharmacist)?;
                self.require_status("start processing", OrderStatus::Paid)?;

                Ok(vec![Event::ProcessingStarted {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::MarkReadyForDispatch { actor } => {
                self.validate_existing()?;
                actor.require(Role::Pharmacist)?;
                self.require_status("mark ready for dispatch", OrderStatus::Processing)?;

                let now = Utc::now();
                // A retry after a lost commit reuses the package written by the first attempt.
                let package = match services.deliveries.find_by_order(&self.id).await? {
                    Some(existing) => existing,
                    None => {
                        let patient = services
                            .accounts
                            .get(&self.patient_id)
                            .await?
                            .ok_or_else(|| Error::not_found("Patient", self.patient_id.as_str()))?;
                        let package = DeliveryPackage::snapshot(
                            &self.id,
                            &self.order_number,
                            PatientContact {
                                name: patient.name,
                                phone: patient.phone,
                            },
                            self.delivery_address.clone(),
                            now,
                        );
                        if services.deliveries.insert_if_absent(&package).await? {
                            tracing::info!(order_id = %self.id, package_id = %package.id, "Delivery package created");
                            package
                        } else {
                            services
                                .deliveries
                                .find_by_order(&self.id)
                                .await?
                                .ok_or_else(|| Error::not_found("Delivery package", self.id.as_str()))?
                        }
                    }
                };

                Ok(vec![Event::ReadyForDispatch {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    package,
                    updated_at: now,
                }])
            }

            Command::CompleteOrder { actor } => {
                self.validate_existing()?;
                actor.require(Role::Pharmacist)?;
                self.require_status("complete", OrderStatus::ReadyForDispatch)?;

                Ok(vec![Event::OrderCompleted {
                    id: self.id.clone(),
                    order_number: self.order_number.clone(),
                    patient_id: self.patient_id.clone(),
                    updated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::PrescriptionSubmitted {
                id,
                order_number,
                patient_id,
                doctor_id,
                prescription_reference,
                delivery_address,
                created_at,
            } => {
                self.id = id;
                self.order_number = order_number;
                self.patient_id = patient_id;
                self.doctor_id = doctor_id;
                self.prescription_reference = prescription_reference;
                self.delivery_address = delivery_address;
                self.status = OrderStatus::PendingReview;
                self.payment_status = PaymentStatus::Pending;
                self.created_at = created_at;
                self.updated_at = created_at;
            }

            Event::OrderApproved {
                line_items,
                reviewed_by,
                pharmacist_notes,
                updated_at,
                ..
            } => {
                self.total_amount = pricing::order_total(&line_items);
                self.line_items = line_items;
                self.reviewed_by.get_or_insert(reviewed_by);
                self.pharmacist_notes = pharmacist_notes;
                self.status = OrderStatus::AwaitingPayment;
                self.updated_at = updated_at;
            }

            Event::OrderRejected {
                reviewed_by,
                rejection_reason,
                updated_at,
                ..
            } => {
                self.reviewed_by.get_or_insert(reviewed_by);
                self.rejection_reason = rejection_reason;
                self.status = OrderStatus::Rejected;
                self.updated_at = updated_at;
            }

            Event::OrderPaid {
                payment_method,
                transaction_id,
                updated_at,
                ..
            } => {
                self.payment = Some(PaymentDetails {
                    payment_method,
                    transaction_id,
                    paid_at: updated_at,
                });
                self.payment_status = PaymentStatus::Completed;
                self.status = OrderStatus::Paid;
                self.updated_at = updated_at;
            }

            Event::ProcessingStarted { updated_at, .. } => {
                self.status = OrderStatus::Processing;
                self.updated_at = updated_at;
            }

            Event::ReadyForDispatch {
                package, updated_at, ..
            } => {
                self.delivery_package_id = Some(package.id);
                self.status = OrderStatus::ReadyForDispatch;
                self.updated_at = updated_at;
            }

            Event::OrderCompleted { updated_at, .. } => {
                self.status = OrderStatus::Completed;
                self.updated_at = updated_at;
            }
        }
    }
}

impl PrescriptionOrder {
    /// Whether the caller may read this order.
    pub fn visible_to(&self, identity: &Identity) -> bool {
        match identity.role {
            Role::Patient => self.patient_id == identity.user_id,
            Role::Doctor => self.doctor_id.as_deref() == Some(identity.user_id.as_str()),
            Role::Pharmacist | Role::Admin => true,
        }
    }

    fn validate_new(&self, id: &str) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::validation(format!("order {id} already exists")));
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::not_found("Order", ""));
        }
        Ok(())
    }

    fn validate_owner(&self, actor: &Identity) -> Result<(), Error> {
        match actor.role {
            Role::Patient if actor.user_id == self.patient_id => Ok(()),
            Role::Patient | Role::Doctor | Role::Pharmacist | Role::Admin => {
                Err(Error::forbidden("order belongs to another patient"))
            }
        }
    }

    fn require_status(&self, action: &str, expected: OrderStatus) -> Result<(), Error> {
        if self.status != expected {
            return Err(Error::InvalidState {
                entity: "Order".to_string(),
                action: action.to_string(),
                expected: expected.to_string(),
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accounts::Account,
        catalog::Medicine,
        orders::inputs::MedicineRequest,
        store::memory::{MemoryAccountStore, MemoryCatalogStore, MemoryDeliveryStore},
    };

    struct UnavailableDeliveryStore;

    #[async_trait]
    impl DeliveryStore for UnavailableDeliveryStore {
        async fn insert_if_absent(&self, _: &DeliveryPackage) -> Result<bool, Error> {
            Err(Error::store("deliveries table unavailable"))
        }
        async fn get(&self, _: &str) -> Result<Option<DeliveryPackage>, Error> {
            Ok(None)
        }
        async fn find_by_order(&self, _: &str) -> Result<Option<DeliveryPackage>, Error> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<DeliveryPackage>, Error> {
            Ok(vec![])
        }
        async fn put(&self, _: &DeliveryPackage) -> Result<(), Error> {
            Err(Error::store("deliveries table unavailable"))
        }
    }

    const PATIENT: &str = "patient-1";

    fn patient() -> Identity {
        Identity::new(PATIENT, Role::Patient)
    }

    fn pharmacist() -> Identity {
        Identity::new("pharm-1", Role::Pharmacist)
    }

    async fn services() -> (Services, Arc<MemoryCatalogStore>) {
        let accounts = Arc::new(MemoryAccountStore::default());
        accounts
            .put(&Account {
                id: PATIENT.to_string(),
                name: "Ravi".to_string(),
                email: "ravi@example.com".to_string(),
                phone: "555-0101".to_string(),
                role: Role::Patient,
                address: Some(Address {
                    street: "12 Lake Rd".to_string(),
                    city: "Pune".to_string(),
                    state: "MH".to_string(),
                    zip_code: "411001".to_string(),
                }),
                specialization: None,
                credential_hash: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let catalog = Arc::new(MemoryCatalogStore::default());
        catalog
            .put(&Medicine {
                id: "M1".to_string(),
                name: "Amoxicillin".to_string(),
                generic_name: None,
                category: None,
                price: 15,
                stock: 50,
                requires_prescription: true,
                expiry_date: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let deliveries = Arc::new(MemoryDeliveryStore::default());
        (
            Services::new(accounts, catalog.clone(), deliveries, StockReservations::default()),
            catalog,
        )
    }

    async fn run(
        order: &mut PrescriptionOrder,
        command: Command,
        services: &Services,
    ) -> Result<(), Error> {
        let events = order.handle(command, services).await?;
        for event in events {
            order.apply(event);
        }
        Ok(())
    }

    fn submit() -> Command {
        Command::SubmitPrescription {
            id: "o1".to_string(),
            order_number: "ORD-1".to_string(),
            actor: patient(),
            prescription_reference: "rx1.png".to_string(),
            doctor_id: None,
        }
    }

    fn approve(quantity: u32, price: Option<u64>) -> Command {
        Command::ApproveOrder {
            actor: pharmacist(),
            medicines: vec![MedicineRequest {
                medicine_id: "M1".to_string(),
                quantity,
                price,
            }],
            pharmacist_notes: None,
            reservation_id: "r1".to_string(),
        }
    }

    fn pay(actor: Identity) -> Command {
        Command::PayOrder {
            actor,
            payment_method: "card".to_string(),
            transaction_id: "txn-1".to_string(),
        }
    }

    async fn order_in(status: OrderStatus, services: &Services) -> PrescriptionOrder {
        let mut order = PrescriptionOrder::default();
        run(&mut order, submit(), services).await.unwrap();
        let steps = [
            (OrderStatus::AwaitingPayment, approve(2, Some(10))),
            (OrderStatus::Paid, pay(patient())),
            (OrderStatus::Processing, Command::StartProcessing { actor: pharmacist() }),
            (
                OrderStatus::ReadyForDispatch,
                Command::MarkReadyForDispatch { actor: pharmacist() },
            ),
            (OrderStatus::Completed, Command::CompleteOrder { actor: pharmacist() }),
        ];
        for (reached, command) in steps {
            if order.status == status {
                break;
            }
            run(&mut order, command, services).await.unwrap();
            assert_eq!(order.status, reached);
        }
        order
    }

    #[tokio::test]
    async fn submit_snapshots_patient_address() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::PendingReview, &services).await;

        assert_eq!(order.status, OrderStatus::PendingReview);
        assert_eq!(order.prescription_reference, "rx1.png");
        assert_eq!(order.delivery_address.city, "Pune");
        assert!(order.line_items.is_empty());
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn submit_for_unknown_patient_is_not_found() {
        let (services, _) = services().await;
        let order = PrescriptionOrder::default();
        let err = order
            .handle(
                Command::SubmitPrescription {
                    id: "o1".to_string(),
                    order_number: "ORD-1".to_string(),
                    actor: Identity::new("ghost", Role::Patient),
                    prescription_reference: "rx.png".to_string(),
                    doctor_id: None,
                },
                &services,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn submit_requires_prescription_reference() {
        let (services, _) = services().await;
        let err = PrescriptionOrder::default()
            .handle(
                Command::SubmitPrescription {
                    id: "o1".to_string(),
                    order_number: "ORD-1".to_string(),
                    actor: patient(),
                    prescription_reference: "  ".to_string(),
                    doctor_id: None,
                },
                &services,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn approve_prices_items_and_takes_stock() {
        let (services, catalog) = services().await;
        let order = order_in(OrderStatus::AwaitingPayment, &services).await;

        assert_eq!(order.total_amount, 20);
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].name, "Amoxicillin");
        assert_eq!(order.reviewed_by.as_deref(), Some("pharm-1"));
        assert_eq!(catalog.get("M1").await.unwrap().unwrap().stock, 48);
    }

    #[tokio::test]
    async fn approve_above_stock_is_conflict_and_emits_nothing() {
        let (services, catalog) = services().await;
        let order = order_in(OrderStatus::PendingReview, &services).await;

        let err = order.handle(approve(100, None), &services).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(order.status, OrderStatus::PendingReview);
        assert_eq!(catalog.get("M1").await.unwrap().unwrap().stock, 50);
    }

    #[tokio::test]
    async fn only_pharmacists_review_orders() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::PendingReview, &services).await;
        let err = order
            .handle(
                Command::RejectOrder {
                    actor: patient(),
                    rejection_reason: None,
                },
                &services,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[tokio::test]
    async fn reject_is_terminal_and_keeps_first_reviewer() {
        let (services, _) = services().await;
        let mut order = order_in(OrderStatus::PendingReview, &services).await;
        run(
            &mut order,
            Command::RejectOrder {
                actor: pharmacist(),
                rejection_reason: Some("illegible".to_string()),
            },
            &services,
        )
        .await
        .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.rejection_reason.as_deref(), Some("illegible"));

        let err = order.handle(approve(1, None), &services).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        let err = order
            .handle(
                Command::RejectOrder {
                    actor: Identity::new("pharm-2", Role::Pharmacist),
                    rejection_reason: None,
                },
                &services,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(order.reviewed_by.as_deref(), Some("pharm-1"));
    }

    #[tokio::test]
    async fn pay_checks_owner_before_status() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::PendingReview, &services).await;

        let err = order
            .handle(pay(Identity::new("someone-else", Role::Patient)), &services)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));

        let err = order.handle(pay(patient()), &services).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn paying_twice_is_invalid_state() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::Paid, &services).await;
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(
            order.payment.as_ref().map(|p| p.transaction_id.as_str()),
            Some("txn-1")
        );

        let err = order.handle(pay(patient()), &services).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn ready_for_dispatch_snapshots_delivery_package() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::Processing, &services).await;

        let events = order
            .handle(Command::MarkReadyForDispatch { actor: pharmacist() }, &services)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ReadyForDispatch { package, .. } => {
                assert_eq!(package.order_id, order.id);
                assert_eq!(package.patient.name, "Ravi");
                assert_eq!(package.patient.phone, "555-0101");
                assert_eq!(package.delivery_address, order.delivery_address);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn ready_for_dispatch_stores_package_before_emitting() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::Processing, &services).await;

        let first = order
            .handle(Command::MarkReadyForDispatch { actor: pharmacist() }, &services)
            .await
            .unwrap();
        let stored = services
            .deliveries
            .find_by_order(&order.id)
            .await
            .unwrap()
            .expect("package stored while handling");

        // Handling again, as after a lost commit, reuses the stored package.
        let second = order
            .handle(Command::MarkReadyForDispatch { actor: pharmacist() }, &services)
            .await
            .unwrap();
        for events in [first, second] {
            match &events[0] {
                Event::ReadyForDispatch { package, .. } => assert_eq!(package, &stored),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(services.deliveries.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ready_for_dispatch_fails_when_package_cannot_be_stored() {
        let (services, _) = services().await;
        let order = order_in(OrderStatus::Processing, &services).await;
        let broken = Services {
            deliveries: Arc::new(UnavailableDeliveryStore),
            ..services
        };

        let err = order
            .handle(Command::MarkReadyForDispatch { actor: pharmacist() }, &broken)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { .. }), "got {err:?}");
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn transitions_out_of_order_are_invalid_state() {
        let (services, _) = services().await;
        for status in [
            OrderStatus::PendingReview,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::ReadyForDispatch,
            OrderStatus::Completed,
        ] {
            let order = order_in(status, &services).await;
            let commands = [
                (OrderStatus::PendingReview, approve(1, None)),
                (OrderStatus::AwaitingPayment, pay(patient())),
                (OrderStatus::Paid, Command::StartProcessing { actor: pharmacist() }),
                (
                    OrderStatus::Processing,
                    Command::MarkReadyForDispatch { actor: pharmacist() },
                ),
                (
                    OrderStatus::ReadyForDispatch,
                    Command::CompleteOrder { actor: pharmacist() },
                ),
            ];
            for (required, command) in commands {
                if required == status {
                    continue;
                }
                let before = order.clone();
                let err = order.handle(command, &services).await.unwrap_err();
                assert!(
                    matches!(err, Error::InvalidState { .. }),
                    "{status}: expected InvalidState, got {err:?}"
                );
                assert_eq!(order, before);
            }
        }
    }

    #[tokio::test]
    async fn commands_on_missing_order_are_not_found() {
        let (services, _) = services().await;
        let err = PrescriptionOrder::default()
            .handle(Command::StartProcessing { actor: pharmacist() }, &services)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn status_serializes_with_display_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::AwaitingPayment).unwrap(),
            "\"Approved - Awaiting Payment\""
        );
        for status in OrderStatus::ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }

    #[test]
    fn visibility_follows_role() {
        let order = PrescriptionOrder {
            id: "o1".to_string(),
            patient_id: PATIENT.to_string(),
            doctor_id: Some("doc-1".to_string()),
            ..Default::default()
        };
        assert!(order.visible_to(&patient()));
        assert!(!order.visible_to(&Identity::new("p2", Role::Patient)));
        assert!(order.visible_to(&Identity::new("doc-1", Role::Doctor)));
        assert!(!order.visible_to(&Identity::new("doc-2", Role::Doctor)));
        assert!(order.visible_to(&pharmacist()));
        assert!(order.visible_to(&Identity::new("a", Role::Admin)));
    }
}
