use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::{
    persist::{PersistenceError, ViewContext},
    Aggregate, EventEnvelope, View as CqrsView,
};
use serde::{Deserialize, Serialize};

use super::{LineItem, OrderStatus, PaymentStatus, PrescriptionOrder, AGGREGATE_TYPE};
use crate::store::ViewStore;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct View {
    pub aggregate_type: String,
    pub command_id: String,
    pub id: String,
    pub order: PrescriptionOrder,
}

impl CqrsView<PrescriptionOrder> for View {
    fn update(&mut self, event: &EventEnvelope<PrescriptionOrder>) {
        self.id.clone_from(&event.aggregate_id);
        self.aggregate_type = AGGREGATE_TYPE.to_string();
        self.command_id = event
            .metadata
            .get("command_id")
            .cloned()
            .unwrap_or_default();
        self.order.apply(event.payload.clone());
    }
}

/// Pharmacist-facing order listing: no delivery address.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PharmacistOrderSummary {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub patient_id: String,
    pub patient_name: String,
    pub doctor_id: Option<String>,
    pub prescription_reference: String,
    pub line_items: Vec<LineItem>,
    pub total_amount: u64,
    pub payment_status: PaymentStatus,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PharmacistOrderSummary {
    pub fn new(order: &PrescriptionOrder, patient_name: String) -> Self {
        Self {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            status: order.status,
            patient_id: order.patient_id.clone(),
            patient_name,
            doctor_id: order.doctor_id.clone(),
            prescription_reference: order.prescription_reference.clone(),
            line_items: order.line_items.clone(),
            total_amount: order.total_amount,
            payment_status: order.payment_status,
            reviewed_by: order.reviewed_by.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

pub struct Query {
    repo: Arc<dyn ViewStore<View, PrescriptionOrder>>,
}

impl Query {
    pub fn new(repo: Arc<dyn ViewStore<View, PrescriptionOrder>>) -> Self {
        Self { repo }
    }

    async fn update(
        &self,
        order_id: &str,
        events: &[EventEnvelope<PrescriptionOrder>],
    ) -> Result<(), PersistenceError> {
        let (mut view, view_context) = match self.repo.load_with_context(order_id).await? {
            None => {
                let view_context = ViewContext::new(order_id.to_string(), 0);
                (Default::default(), view_context)
            }
            Some((view, context)) => (view, context),
        };

        for event in events {
            view.update(event);
        }

        self.repo.update_view(view, view_context).await
    }
}

#[async_trait]
impl cqrs_es::Query<PrescriptionOrder> for Query {
    async fn dispatch(&self, order_id: &str, events: &[EventEnvelope<PrescriptionOrder>]) {
        if let Err(err) = self.update(order_id, events).await {
            tracing::error!(order_id = %order_id, "OrderQuery error: {}", err);
        }
    }
}
