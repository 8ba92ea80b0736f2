use std::sync::Arc;

use cqrs_es::Query as CqrsQuery;

use super::{Appointment, Query, Services, View};
use crate::{
    bus::{self, CommandBus, EventBackend},
    store::ViewStore,
};

/// Wires the appointment aggregate to its view plus any extra projections.
pub fn init(
    backend: &EventBackend,
    repo: Arc<dyn ViewStore<View, Appointment>>,
    projections: Vec<Box<dyn CqrsQuery<Appointment>>>,
    services: Services,
) -> Arc<dyn CommandBus<Appointment>> {
    let mut queries: Vec<Box<dyn CqrsQuery<Appointment>>> = vec![Box::new(Query::new(repo))];
    queries.extend(projections);

    bus::framework(backend, queries, services)
}
