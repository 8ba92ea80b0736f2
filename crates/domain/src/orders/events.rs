use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::LineItem;
use crate::{accounts::Address, deliveries::DeliveryPackage};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    PrescriptionSubmitted {
        id: String,
        order_number: String,
        patient_id: String,
        doctor_id: Option<String>,
        prescription_reference: String,
        delivery_address: Address,
        created_at: DateTime<Utc>,
    },

    OrderApproved {
        id: String,
        order_number: String,
        patient_id: String,
        line_items: Vec<LineItem>,
        total_amount: u64,
        reviewed_by: String,
        pharmacist_notes: Option<String>,
        updated_at: DateTime<Utc>,
    },

    OrderRejected {
        id: String,
        order_number: String,
        patient_id: String,
        reviewed_by: String,
        rejection_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },

    OrderPaid {
        id: String,
        order_number: String,
        patient_id: String,
        payment_method: String,
        transaction_id: String,
        updated_at: DateTime<Utc>,
    },

    ProcessingStarted {
        id: String,
        order_number: String,
        patient_id: String,
        updated_at: DateTime<Utc>,
    },

    ReadyForDispatch {
        id: String,
        order_number: String,
        patient_id: String,
        package: DeliveryPackage,
        updated_at: DateTime<Utc>,
    },

    OrderCompleted {
        id: String,
        order_number: String,
        patient_id: String,
        updated_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn order_id(&self) -> &str {
        match self {
            Event::PrescriptionSubmitted { id, .. }
            | Event::OrderApproved { id, .. }
            | Event::OrderRejected { id, .. }
            | Event::OrderPaid { id, .. }
            | Event::ProcessingStarted { id, .. }
            | Event::ReadyForDispatch { id, .. }
            | Event::OrderCompleted { id, .. } => id,
        }
    }

    pub fn patient_id(&self) -> &str {
        match self {
            Event::PrescriptionSubmitted { patient_id, .. }
            | Event::OrderApproved { patient_id, .. }
            | Event::OrderRejected { patient_id, .. }
            | Event::OrderPaid { patient_id, .. }
            | Event::ProcessingStarted { patient_id, .. }
            | Event::ReadyForDispatch { patient_id, .. }
            | Event::OrderCompleted { patient_id, .. } => patient_id,
        }
    }
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::PrescriptionSubmitted { .. } => "Order:PrescriptionSubmitted".to_string(),
            Event::OrderApproved { .. } => "Order:Approved".to_string(),
            Event::OrderRejected { .. } => "Order:Rejected".to_string(),
            Event::OrderPaid { .. } => "Order:Paid".to_string(),
            Event::ProcessingStarted { .. } => "Order:ProcessingStarted".to_string(),
            Event::ReadyForDispatch { .. } => "Order:ReadyForDispatch".to_string(),
            Event::OrderCompleted { .. } => "Order:Completed".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
