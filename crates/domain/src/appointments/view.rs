use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{
    persist::{PersistenceError, ViewContext},
    Aggregate, EventEnvelope, View as CqrsView,
};
use serde::{Deserialize, Serialize};

use super::{Appointment, AGGREGATE_TYPE};
use crate::store::ViewStore;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct View {
    pub aggregate_type: String,
    pub command_id: String,
    pub id: String,
    pub appointment: Appointment,
}

impl CqrsView<Appointment> for View {
    fn update(&mut self, event: &EventEnvelope<Appointment>) {
        self.id.clone_from(&event.aggregate_id);
        self.aggregate_type = AGGREGATE_TYPE.to_string();
        self.command_id = event
            .metadata
            .get("command_id")
            .cloned()
            .unwrap_or_default();
        self.appointment.apply(event.payload.clone());
    }
}

pub struct Query {
    repo: Arc<dyn ViewStore<View, Appointment>>,
}

impl Query {
    pub fn new(repo: Arc<dyn ViewStore<View, Appointment>>) -> Self {
        Self { repo }
    }

    async fn update(
        &self,
        appointment_id: &str,
        events: &[EventEnvelope<Appointment>],
    ) -> Result<(), PersistenceError> {
        let (mut view, view_context) = match self.repo.load_with_context(appointment_id).await? {
            None => {
                let view_context = ViewContext::new(appointment_id.to_string(), 0);
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
impl cqrs_es::Query<Appointment> for Query {
    async fn dispatch(&self, appointment_id: &str, events: &[EventEnvelope<Appointment>]) {
        if let Err(err) = self.update(appointment_id, events).await {
            tracing::error!(appointment_id = %appointment_id, "AppointmentQuery error: {}", err);
        }
    }
}
