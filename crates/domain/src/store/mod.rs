use async_trait::async_trait;
use cqrs_es::{persist::ViewRepository, Aggregate, View};

use crate::errors::Error;

/// DynamoDB-backed stores
pub mod dynamo;

/// In-process stores for local runs and tests
pub mod memory;

/// A view repository that can also enumerate its views.
#[async_trait]
pub trait ViewStore<V, A>: ViewRepository<V, A>
where
    V: View<A>,
    A: Aggregate,
{
    async fn list(&self) -> Result<Vec<V>, Error>;
}
