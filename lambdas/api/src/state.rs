use std::sync::Arc;

use aws_config::SdkConfig;
use cqrs_es::Query;
use domain::{
    accounts::AccountStore,
    appointments::{self, Appointment, AppointmentService},
    auth::{AuthService, ExpiringStore},
    bus::EventBackend,
    catalog::{CatalogStore, StockReservations},
    deliveries::{DeliveryQuery, DeliveryStore},
    notifications::{
        BroadcastChannel, EmailSender, KinesisChannel, LogEmailSender, NotificationGateway,
        NotificationQuery, NotificationStore, RealtimeChannel,
    },
    orders::{self, OrderService, PrescriptionOrder},
    relationships::{RelationshipQuery, RelationshipStore},
    store::{
        dynamo::{
            DynamoAccountStore, DynamoCatalogStore, DynamoDeliveryStore, DynamoExpiringStore,
            DynamoNotificationStore, DynamoRelationshipStore, DynamoTable, DynamoViewStore,
        },
        memory::{
            MemoryAccountStore, MemoryCatalogStore, MemoryDeliveryStore, MemoryExpiringStore,
            MemoryNotificationStore, MemoryRelationshipStore, MemoryViewStore,
        },
        ViewStore,
    },
};

use crate::{
    config::Config,
    uploads::{LocalUploads, S3Uploads, UploadSigner},
};

/// Every persistence seam, picked once at startup.
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub relationships: Arc<dyn RelationshipStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub keys: Arc<dyn ExpiringStore>,
    pub orders_view: Arc<dyn ViewStore<orders::View, PrescriptionOrder>>,
    pub appointments_view: Arc<dyn ViewStore<appointments::View, Appointment>>,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            accounts: Arc::new(MemoryAccountStore::default()),
            catalog: Arc::new(MemoryCatalogStore::default()),
            relationships: Arc::new(MemoryRelationshipStore::default()),
            deliveries: Arc::new(MemoryDeliveryStore::default()),
            notifications: Arc::new(MemoryNotificationStore::default()),
            keys: Arc::new(MemoryExpiringStore::default()),
            orders_view: Arc::new(MemoryViewStore::<orders::View>::default()),
            appointments_view: Arc::new(MemoryViewStore::<appointments::View>::default()),
        }
    }

    pub fn dynamo(client: &aws_sdk_dynamodb::Client, config: &Config) -> Self {
        let table = |name: &str| DynamoTable::new(client.clone(), name.to_string());
        let tables = &config.tables;
        Self {
            accounts: Arc::new(DynamoAccountStore::new(table(&tables.accounts))),
            catalog: Arc::new(DynamoCatalogStore::new(table(&tables.medicines))),
            relationships: Arc::new(DynamoRelationshipStore::new(table(&tables.relationships))),
            deliveries: Arc::new(DynamoDeliveryStore::new(table(&tables.deliveries))),
            notifications: Arc::new(DynamoNotificationStore::new(table(&tables.notifications))),
            keys: Arc::new(DynamoExpiringStore::new(table(&tables.expiring_keys))),
            orders_view: Arc::new(DynamoViewStore::<orders::View, PrescriptionOrder>::new(
                &tables.orders_view,
                client.clone(),
            )),
            appointments_view: Arc::new(DynamoViewStore::<appointments::View, Appointment>::new(
                &tables.appointments_view,
                client.clone(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub relationships: Arc<dyn RelationshipStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub gateway: Arc<NotificationGateway>,
    pub auth: AuthService,
    pub orders: OrderService,
    pub appointments: AppointmentService,
    pub uploads: Arc<dyn UploadSigner>,
}

impl AppState {
    pub fn build(
        stores: Stores,
        backend: &EventBackend,
        realtime: Arc<dyn RealtimeChannel>,
        email: Arc<dyn EmailSender>,
        uploads: Arc<dyn UploadSigner>,
        config: &Config,
    ) -> Self {
        let gateway = Arc::new(NotificationGateway::new(
            stores.notifications.clone(),
            realtime,
            email.clone(),
            stores.accounts.clone(),
            config.email_timeout,
        ));

        let order_projections: Vec<Box<dyn Query<PrescriptionOrder>>> = vec![
            Box::new(DeliveryQuery::new(stores.deliveries.clone())),
            Box::new(RelationshipQuery::new(stores.relationships.clone())),
            Box::new(NotificationQuery::new(gateway.clone())),
        ];
        let reservations = StockReservations::default();
        let orders_cqrs = orders::cqrs::init(
            backend,
            stores.orders_view.clone(),
            order_projections,
            orders::Services::new(
                stores.accounts.clone(),
                stores.catalog.clone(),
                stores.deliveries.clone(),
                reservations.clone(),
            ),
        );

        let appointment_projections: Vec<Box<dyn Query<Appointment>>> = vec![
            Box::new(RelationshipQuery::new(stores.relationships.clone())),
            Box::new(NotificationQuery::new(gateway.clone())),
        ];
        let appointments_cqrs = appointments::cqrs::init(
            backend,
            stores.appointments_view.clone(),
            appointment_projections,
            appointments::Services::new(stores.accounts.clone()),
        );

        Self {
            orders: OrderService::new(
                orders_cqrs,
                stores.orders_view,
                stores.accounts.clone(),
                stores.catalog.clone(),
                stores.deliveries.clone(),
                reservations,
            ),
            appointments: AppointmentService::new(appointments_cqrs, stores.appointments_view),
            auth: AuthService::new(
                stores.accounts.clone(),
                stores.keys,
                email,
                config.otp_ttl,
                config.session_ttl,
            ),
            accounts: stores.accounts,
            catalog: stores.catalog,
            relationships: stores.relationships,
            deliveries: stores.deliveries,
            notifications: stores.notifications,
            gateway,
            uploads,
        }
    }

    /// Everything in process: local development and tests.
    pub fn memory(config: &Config) -> Self {
        Self::build(
            Stores::memory(),
            &EventBackend::Memory,
            Arc::new(BroadcastChannel::new(256)),
            Arc::new(LogEmailSender),
            Arc::new(LocalUploads),
            config,
        )
    }

    pub fn aws(sdk_config: &SdkConfig, config: &Config) -> Self {
        let dynamodb = aws_sdk_dynamodb::Client::new(sdk_config);
        let realtime: Arc<dyn RealtimeChannel> = match &config.realtime_stream {
            Some(stream) => Arc::new(KinesisChannel::new(
                aws_sdk_kinesis::Client::new(sdk_config),
                stream.clone(),
            )),
            None => Arc::new(BroadcastChannel::new(16)),
        };
        let uploads = Arc::new(S3Uploads::new(
            aws_sdk_s3::Client::new(sdk_config),
            config.prescriptions_bucket.clone(),
            config.upload_url_ttl,
        ));
        let backend = EventBackend::Dynamo {
            client: dynamodb.clone(),
            event_table: config.tables.event_log.clone(),
            snapshot_table: config.tables.event_snapshots.clone(),
            snapshot_size: config.snapshot_size,
        };

        Self::build(
            Stores::dynamo(&dynamodb, config),
            &backend,
            realtime,
            Arc::new(LogEmailSender),
            uploads,
            config,
        )
    }
}
