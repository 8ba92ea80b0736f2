use std::sync::Arc;

use cqrs_es::Query as CqrsQuery;

use super::{PrescriptionOrder, Query, Services, View};
use crate::{
    bus::{self, CommandBus, EventBackend},
    store::ViewStore,
};

/// Wires the order aggregate to its view plus any extra projections.
pub fn init(
    backend: &EventBackend,
    repo: Arc<dyn ViewStore<View, PrescriptionOrder>>,
    projections: Vec<Box<dyn CqrsQuery<PrescriptionOrder>>>,
    services: Services,
) -> Arc<dyn CommandBus<PrescriptionOrder>> {
    let mut queries: Vec<Box<dyn CqrsQuery<PrescriptionOrder>>> =
        vec![Box::new(Query::new(repo))];
    queries.extend(projections);

    bus::framework(backend, queries, services)
}
