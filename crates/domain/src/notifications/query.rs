use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::EventEnvelope;

use super::{NotificationGateway, NotificationKind, Outgoing};
use crate::{
    appointments::{Appointment, Event as AppointmentEvent},
    orders::{Event as OrderEvent, PrescriptionOrder},
};

/// Turns workflow events into user notifications through the gateway.
pub struct NotificationQuery {
    gateway: Arc<NotificationGateway>,
}

impl NotificationQuery {
    pub fn new(gateway: Arc<NotificationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl cqrs_es::Query<PrescriptionOrder> for NotificationQuery {
    async fn dispatch(&self, _order_id: &str, events: &[EventEnvelope<PrescriptionOrder>]) {
        for event in events {
            if let Some(outgoing) = order_notification(&event.payload) {
                self.gateway.dispatch(outgoing).await;
            }
        }
    }
}

#[async_trait]
impl cqrs_es::Query<Appointment> for NotificationQuery {
    async fn dispatch(&self, _appointment_id: &str, events: &[EventEnvelope<Appointment>]) {
        for event in events {
            if let Some(outgoing) = appointment_notification(&event.payload) {
                self.gateway.dispatch(outgoing).await;
            }
        }
    }
}

pub fn order_notification(event: &OrderEvent) -> Option<Outgoing> {
    let (title, message, kind, email) = match event {
        OrderEvent::PrescriptionSubmitted { .. } => return None,
        OrderEvent::OrderApproved {
            order_number,
            total_amount,
            ..
        } => (
            "Order Approved",
            format!(
                "Your prescription order #{order_number} has been approved by the pharmacist. Amount due: {total_amount}."
            ),
            NotificationKind::Success,
            true,
        ),
        OrderEvent::OrderRejected {
            order_number,
            rejection_reason,
            ..
        } => (
            "Order Rejected",
            format!(
                "Your prescription order #{order_number} has been rejected by the pharmacist. {}",
                rejection_reason.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            NotificationKind::Error,
            true,
        ),
        OrderEvent::OrderPaid { order_number, .. } => (
            "Payment Received",
            format!("Payment for your prescription order #{order_number} was received."),
            NotificationKind::Success,
            false,
        ),
        OrderEvent::ProcessingStarted { order_number, .. } => (
            "Order Processing",
            format!("Your prescription order #{order_number} is now being processed."),
            NotificationKind::Info,
            false,
        ),
        OrderEvent::ReadyForDispatch {
            order_number,
            package,
            ..
        } => (
            "Order Ready for Dispatch",
            format!(
                "Your prescription order #{order_number} is ready for pickup/delivery. Tracking id: {}.",
                package.tracking_id
            ),
            NotificationKind::Success,
            true,
        ),
        OrderEvent::OrderCompleted { order_number, .. } => (
            "Order Completed",
            format!("Your prescription order #{order_number} has been completed."),
            NotificationKind::Success,
            false,
        ),
    };

    Some(Outgoing::new(
        event.patient_id().to_string(),
        title.to_string(),
        message,
        kind,
        Some(event.order_id().to_string()),
        email,
    ))
}

pub fn appointment_notification(event: &AppointmentEvent) -> Option<Outgoing> {
    let outgoing = match event {
        AppointmentEvent::AppointmentBooked {
            id,
            patient_name,
            doctor_id,
            appointment_date,
            time_slot,
            ..
        } => Outgoing::new(
            doctor_id.clone(),
            "New Appointment".to_string(),
            format!(
                "{patient_name} booked an appointment on {} at {time_slot}.",
                appointment_date.format("%Y-%m-%d")
            ),
            NotificationKind::Info,
            Some(id.clone()),
            true,
        ),
        AppointmentEvent::AppointmentCancelled { id, doctor_id, .. } => Outgoing::new(
            doctor_id.clone(),
            "Appointment Cancelled".to_string(),
            "A patient cancelled their appointment.".to_string(),
            NotificationKind::Warning,
            Some(id.clone()),
            false,
        ),
        AppointmentEvent::AppointmentAccepted { id, patient_id, .. } => Outgoing::new(
            patient_id.clone(),
            "Appointment Confirmed".to_string(),
            "Your appointment has been accepted by the doctor.".to_string(),
            NotificationKind::Success,
            Some(id.clone()),
            true,
        ),
        AppointmentEvent::AppointmentRejected {
            id,
            patient_id,
            reason,
            ..
        } => Outgoing::new(
            patient_id.clone(),
            "Appointment Declined".to_string(),
            match reason {
                Some(reason) => format!("Your appointment was declined by the doctor: {reason}"),
                None => "Your appointment was declined by the doctor.".to_string(),
            },
            NotificationKind::Error,
            Some(id.clone()),
            false,
        ),
    };
    Some(outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn submission_is_silent_and_approval_emails_the_patient() {
        let submitted = OrderEvent::PrescriptionSubmitted {
            id: "o1".to_string(),
            order_number: "ORD-1".to_string(),
            patient_id: "p1".to_string(),
            doctor_id: None,
            prescription_reference: "rx1.png".to_string(),
            delivery_address: Default::default(),
            created_at: Utc::now(),
        };
        assert!(order_notification(&submitted).is_none());

        let approved = OrderEvent::OrderApproved {
            id: "o1".to_string(),
            order_number: "ORD-1".to_string(),
            patient_id: "p1".to_string(),
            line_items: vec![],
            total_amount: 20,
            reviewed_by: "ph1".to_string(),
            pharmacist_notes: None,
            updated_at: Utc::now(),
        };
        let outgoing = order_notification(&approved).unwrap();
        assert_eq!(outgoing.recipient, "p1");
        assert_eq!(outgoing.title, "Order Approved");
        assert_eq!(outgoing.related_id.as_deref(), Some("o1"));
        assert!(outgoing.email);
    }

    #[test]
    fn rejection_without_reason_has_no_trailing_space() {
        let rejected = OrderEvent::OrderRejected {
            id: "o1".to_string(),
            order_number: "ORD-1".to_string(),
            patient_id: "p1".to_string(),
            reviewed_by: "ph1".to_string(),
            rejection_reason: None,
            updated_at: Utc::now(),
        };
        let outgoing = order_notification(&rejected).unwrap();
        assert!(outgoing.message.ends_with("pharmacist."));
        assert_eq!(outgoing.kind, NotificationKind::Error);
    }

    #[test]
    fn booking_notifies_the_doctor() {
        let booked = AppointmentEvent::AppointmentBooked {
            id: "a1".to_string(),
            patient_id: "p1".to_string(),
            patient_name: "Kiran".to_string(),
            doctor_id: "d1".to_string(),
            appointment_date: Utc::now(),
            time_slot: "10:00".to_string(),
            reason: None,
            created_at: Utc::now(),
        };
        let outgoing = appointment_notification(&booked).unwrap();
        assert_eq!(outgoing.recipient, "d1");
        assert!(outgoing.message.starts_with("Kiran booked"));
    }
}
