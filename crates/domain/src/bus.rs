use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use cqrs_es::{
    mem_store::MemStore,
    persist::PersistedEventStore,
    Aggregate, AggregateError, CqrsFramework, EventStore, Query,
};
use dynamo_es::DynamoEventRepository;
use tokio::sync::Mutex;

/// Object-safe front for a `CqrsFramework`, so handlers do not carry the event store type.
#[async_trait]
pub trait CommandBus<A>: Send + Sync
where
    A: Aggregate,
    A::Command: Send,
{
    async fn execute_with_metadata(
        &self,
        aggregate_id: &str,
        command: A::Command,
        metadata: HashMap<String, String>,
    ) -> Result<(), AggregateError<A::Error>>;
}

#[async_trait]
impl<A, ES> CommandBus<A> for CqrsFramework<A, ES>
where
    A: Aggregate,
    A::Command: Send,
    ES: EventStore<A>,
    ES::AC: Send,
{
    async fn execute_with_metadata(
        &self,
        aggregate_id: &str,
        command: A::Command,
        metadata: HashMap<String, String>,
    ) -> Result<(), AggregateError<A::Error>> {
        CqrsFramework::execute_with_metadata(self, aggregate_id, command, metadata).await
    }
}

/// The in-memory event store does not check sequence numbers, so commands are
/// run one at a time to keep status transitions atomic.
struct Serialized<A: Aggregate> {
    inner: CqrsFramework<A, MemStore<A>>,
    lock: Mutex<()>,
}

#[async_trait]
impl<A> CommandBus<A> for Serialized<A>
where
    A: Aggregate,
    A::Command: Send,
{
    async fn execute_with_metadata(
        &self,
        aggregate_id: &str,
        command: A::Command,
        metadata: HashMap<String, String>,
    ) -> Result<(), AggregateError<A::Error>> {
        let _guard = self.lock.lock().await;
        self.inner
            .execute_with_metadata(aggregate_id, command, metadata)
            .await
    }
}

/// Where aggregate events are persisted.
#[derive(Clone, Debug)]
pub enum EventBackend {
    Dynamo {
        client: aws_sdk_dynamodb::Client,
        event_table: String,
        snapshot_table: String,
        snapshot_size: usize,
    },
    Memory,
}

pub fn framework<A>(
    backend: &EventBackend,
    queries: Vec<Box<dyn Query<A>>>,
    services: A::Services,
) -> Arc<dyn CommandBus<A>>
where
    A: Aggregate + 'static,
    A::Command: Send,
{
    match backend {
        EventBackend::Dynamo {
            client,
            event_table,
            snapshot_table,
            snapshot_size,
        } => {
            let store: PersistedEventStore<DynamoEventRepository, A> =
                PersistedEventStore::new_snapshot_store(
                    DynamoEventRepository::new(client.clone())
                        .with_tables(event_table, snapshot_table),
                    *snapshot_size,
                );
            Arc::new(CqrsFramework::new(store, queries, services))
        }
        EventBackend::Memory => Arc::new(Serialized {
            inner: CqrsFramework::new(MemStore::<A>::default(), queries, services),
            lock: Mutex::new(()),
        }),
    }
}

/// Metadata attached to every command, as the event log expects it.
pub fn command_metadata(actor_id: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("command_id".to_string(), ulid::Ulid::new().to_string());
    metadata.insert("actor_id".to_string(), actor_id.to_string());
    metadata
}
