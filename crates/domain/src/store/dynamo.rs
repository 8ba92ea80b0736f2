use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    types::{AttributeValue, TransactWriteItem, Update},
    Client,
};
use chrono::{SecondsFormat, Utc};
use cqrs_es::{
    persist::{PersistenceError, ViewContext, ViewRepository},
    Aggregate, View,
};
use derive_new::new;
use dynamo_es::DynamoViewRepository;
use serde::{de::DeserializeOwned, Serialize};

use super::ViewStore;
use crate::{
    accounts::{Account, AccountStore, Role},
    auth::ExpiringStore,
    catalog::{merge_requests, CatalogStore, Medicine, StockRequest},
    deliveries::{DeliveryPackage, DeliveryStore},
    errors::Error,
    notifications::{Notification, NotificationStore},
    relationships::{DoctorPatient, RelationshipStore},
};

type Item = HashMap<String, AttributeValue>;

fn key(pairs: &[(&str, &str)]) -> Item {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.to_string())))
        .collect()
}

/// One DynamoDB table holding `serde_dynamo` items.
#[derive(Clone, Debug, new)]
pub struct DynamoTable {
    client: Client,
    name: String,
}

impl DynamoTable {
    async fn get<T: DeserializeOwned>(&self, key: Item) -> Result<Option<T>, Error> {
        let output = self
            .client
            .get_item()
            .table_name(&self.name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|err| Error::store(DisplayErrorContext(err)))?;
        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(Error::from))
            .transpose()
    }

    async fn put<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let item: Item = serde_dynamo::to_item(value)?;
        self.client
            .put_item()
            .table_name(&self.name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|err| Error::store(DisplayErrorContext(err)))?;
        Ok(())
    }

    /// Returns false when an item with the same partition key already exists.
    async fn put_if_absent<T: Serialize>(&self, value: &T, partition_key: &str) -> Result<bool, Error> {
        let item: Item = serde_dynamo::to_item(value)?;
        let result = self
            .client
            .put_item()
            .table_name(&self.name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", partition_key)
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(Error::store(DisplayErrorContext(err))),
        }
    }

    async fn delete(&self, key: Item) -> Result<(), Error> {
        self.client
            .delete_item()
            .table_name(&self.name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|err| Error::store(DisplayErrorContext(err)))?;
        Ok(())
    }

    async fn scan<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.scan_items()
            .await?
            .into_iter()
            .map(|item| serde_dynamo::from_item(item).map_err(Error::from))
            .collect()
    }

    async fn scan_items(&self) -> Result<Vec<Item>, Error> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| Error::store(DisplayErrorContext(err)))?;
            items.extend(output.items.unwrap_or_default());
            match output.last_evaluated_key {
                Some(next) if !next.is_empty() => start_key = Some(next),
                _ => return Ok(items),
            }
        }
    }

    /// Every item whose `attribute` equals `value`, through `index` when given.
    async fn query<T: DeserializeOwned>(
        &self,
        index: Option<&str>,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<T>, Error> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.name)
                .set_index_name(index.map(str::to_string))
                .key_condition_expression("#attr = :value")
                .expression_attribute_names("#attr", attribute)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| Error::store(DisplayErrorContext(err)))?;
            for item in output.items.unwrap_or_default() {
                items.push(serde_dynamo::from_item(item)?);
            }
            match output.last_evaluated_key {
                Some(next) if !next.is_empty() => start_key = Some(next),
                _ => return Ok(items),
            }
        }
    }
}

/// Accounts keyed by `id`, with `email-index` and `role-index` GSIs.
#[derive(Clone, Debug, new)]
pub struct DynamoAccountStore {
    table: DynamoTable,
}

#[async_trait]
impl AccountStore for DynamoAccountStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, Error> {
        self.table.get(key(&[("id", id)])).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let mut accounts: Vec<Account> = self.table.query(Some("email-index"), "email", email).await?;
        Ok(accounts.pop())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>, Error> {
        self.table.query(Some("role-index"), "role", role.as_str()).await
    }

    async fn put(&self, account: &Account) -> Result<(), Error> {
        self.table.put(account).await
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.table.delete(key(&[("id", id)])).await
    }
}

/// Medicines keyed by `id`.
#[derive(Clone, Debug, new)]
pub struct DynamoCatalogStore {
    table: DynamoTable,
}

impl DynamoCatalogStore {
    fn stock_update(&self, request: &StockRequest, now: &str) -> Result<TransactWriteItem, Error> {
        let update = Update::builder()
            .table_name(&self.table.name)
            .set_key(Some(key(&[("id", &request.medicine_id)])))
            .update_expression("SET #stock = #stock - :qty, #updatedAt = :now")
            .condition_expression("attribute_exists(#id) AND #stock >= :qty")
            .expression_attribute_names("#id", "id")
            .expression_attribute_names("#stock", "stock")
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":qty", AttributeValue::N(request.quantity.to_string()))
            .expression_attribute_values(":now", AttributeValue::S(now.to_string()))
            .build()
            .map_err(Error::store)?;
        Ok(TransactWriteItem::builder().update(update).build())
    }

    /// Names the first request that cannot be served, after a cancelled transaction.
    async fn explain_shortage(&self, requests: &[StockRequest]) -> Error {
        for request in requests {
            match self.get(&request.medicine_id).await {
                Ok(None) => return Error::not_found("Medicine", request.medicine_id.as_str()),
                Ok(Some(medicine)) if medicine.stock < request.quantity => {
                    return Error::insufficient_stock(&medicine.name, medicine.stock, request.quantity)
                }
                Ok(Some(_)) => {}
                Err(err) => return err,
            }
        }
        Error::Conflict {
            message: "Stock changed during approval, retry the request".to_string(),
        }
    }
}

#[async_trait]
impl CatalogStore for DynamoCatalogStore {
    async fn get(&self, id: &str) -> Result<Option<Medicine>, Error> {
        self.table.get(key(&[("id", id)])).await
    }

    async fn list(&self) -> Result<Vec<Medicine>, Error> {
        self.table.scan().await
    }

    async fn put(&self, medicine: &Medicine) -> Result<(), Error> {
        self.table.put(medicine).await
    }

    async fn take_stock(&self, requests: &[StockRequest]) -> Result<(), Error> {
        let requests = merge_requests(requests)?;
        if requests.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let items = requests
            .iter()
            .map(|request| self.stock_update(request, &now))
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .table
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_transaction_canceled_exception()) =>
            {
                Err(self.explain_shortage(&requests).await)
            }
            Err(err) => Err(Error::store(DisplayErrorContext(err))),
        }
    }

    async fn restock(&self, requests: &[StockRequest]) -> Result<(), Error> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        for request in merge_requests(requests)? {
            self.table
                .client
                .update_item()
                .table_name(&self.table.name)
                .set_key(Some(key(&[("id", &request.medicine_id)])))
                .update_expression("SET #stock = #stock + :qty, #updatedAt = :now")
                .condition_expression("attribute_exists(#id)")
                .expression_attribute_names("#id", "id")
                .expression_attribute_names("#stock", "stock")
                .expression_attribute_names("#updatedAt", "updatedAt")
                .expression_attribute_values(":qty", AttributeValue::N(request.quantity.to_string()))
                .expression_attribute_values(":now", AttributeValue::S(now.clone()))
                .send()
                .await
                .map_err(|err| Error::store(DisplayErrorContext(err)))?;
        }
        Ok(())
    }
}

/// Relationships keyed by `doctorId` + `patientId`, with a `patientId-index` GSI.
#[derive(Clone, Debug, new)]
pub struct DynamoRelationshipStore {
    table: DynamoTable,
}

#[async_trait]
impl RelationshipStore for DynamoRelationshipStore {
    async fn get(&self, doctor_id: &str, patient_id: &str) -> Result<Option<DoctorPatient>, Error> {
        self.table
            .get(key(&[("doctorId", doctor_id), ("patientId", patient_id)]))
            .await
    }

    async fn put(&self, relation: &DoctorPatient) -> Result<(), Error> {
        self.table.put(relation).await
    }

    async fn list_for_doctor(&self, doctor_id: &str) -> Result<Vec<DoctorPatient>, Error> {
        self.table.query(None, "doctorId", doctor_id).await
    }

    async fn list_for_patient(&self, patient_id: &str) -> Result<Vec<DoctorPatient>, Error> {
        self.table
            .query(Some("patientId-index"), "patientId", patient_id)
            .await
    }

    async fn delete(&self, doctor_id: &str, patient_id: &str) -> Result<(), Error> {
        self.table
            .delete(key(&[("doctorId", doctor_id), ("patientId", patient_id)]))
            .await
    }
}

/// Packages keyed by `orderId` so each order holds at most one, with an `id-index` GSI.
#[derive(Clone, Debug, new)]
pub struct DynamoDeliveryStore {
    table: DynamoTable,
}

#[async_trait]
impl DeliveryStore for DynamoDeliveryStore {
    async fn insert_if_absent(&self, package: &DeliveryPackage) -> Result<bool, Error> {
        self.table.put_if_absent(package, "orderId").await
    }

    async fn get(&self, id: &str) -> Result<Option<DeliveryPackage>, Error> {
        let mut packages: Vec<DeliveryPackage> = self.table.query(Some("id-index"), "id", id).await?;
        Ok(packages.pop())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<DeliveryPackage>, Error> {
        self.table.get(key(&[("orderId", order_id)])).await
    }

    async fn list(&self) -> Result<Vec<DeliveryPackage>, Error> {
        self.table.scan().await
    }

    async fn put(&self, package: &DeliveryPackage) -> Result<(), Error> {
        self.table.put(package).await
    }
}

/// Notifications keyed by `id`, with a `userId-index` GSI.
#[derive(Clone, Debug, new)]
pub struct DynamoNotificationStore {
    table: DynamoTable,
}

#[async_trait]
impl NotificationStore for DynamoNotificationStore {
    async fn put(&self, notification: &Notification) -> Result<(), Error> {
        self.table.put(notification).await
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, Error> {
        self.table.get(key(&[("id", id)])).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>, Error> {
        self.table.query(Some("userId-index"), "userId", user_id).await
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.table.delete(key(&[("id", id)])).await
    }
}

#[derive(serde::Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpiringEntry {
    key: String,
    value: String,
    /// Epoch seconds, the table's TTL attribute.
    expires_at: i64,
}

/// Keyed by `key`; DynamoDB TTL removes entries eventually, reads filter them at once.
#[derive(Clone, Debug, new)]
pub struct DynamoExpiringStore {
    table: DynamoTable,
}

#[async_trait]
impl ExpiringStore for DynamoExpiringStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = ExpiringEntry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: Utc::now().timestamp().saturating_add(ttl),
        };
        self.table.put(&entry).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entry: Option<ExpiringEntry> = self.table.get(self::key(&[("key", key)])).await?;
        Ok(entry
            .filter(|e| e.expires_at > Utc::now().timestamp())
            .map(|e| e.value))
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.table.delete(self::key(&[("key", key)])).await
    }
}

/// `dynamo_es` view repository that can also scan its table.
pub struct DynamoViewStore<V, A>
where
    V: View<A>,
    A: Aggregate,
{
    inner: DynamoViewRepository<V, A>,
    table: DynamoTable,
}

impl<V, A> DynamoViewStore<V, A>
where
    V: View<A>,
    A: Aggregate,
{
    pub fn new(view_table: &str, client: Client) -> Self {
        Self {
            inner: DynamoViewRepository::new(view_table, client.clone()),
            table: DynamoTable::new(client, view_table.to_string()),
        }
    }
}

#[async_trait]
impl<V, A> ViewRepository<V, A> for DynamoViewStore<V, A>
where
    V: View<A>,
    A: Aggregate,
{
    async fn load(&self, view_id: &str) -> Result<Option<V>, PersistenceError> {
        self.inner.load(view_id).await
    }

    async fn load_with_context(
        &self,
        view_id: &str,
    ) -> Result<Option<(V, ViewContext)>, PersistenceError> {
        self.inner.load_with_context(view_id).await
    }

    async fn update_view(&self, view: V, context: ViewContext) -> Result<(), PersistenceError> {
        self.inner.update_view(view, context).await
    }
}

#[async_trait]
impl<V, A> ViewStore<V, A> for DynamoViewStore<V, A>
where
    V: View<A>,
    A: Aggregate,
{
    /// Views are stored by `dynamo_es` as JSON bytes in the `Payload` attribute.
    async fn list(&self) -> Result<Vec<V>, Error> {
        let items = self.table.scan_items().await?;
        let mut views = Vec::with_capacity(items.len());
        for item in items {
            match item.get("Payload") {
                Some(AttributeValue::B(payload)) => {
                    views.push(serde_json::from_slice(payload.as_ref())?)
                }
                _ => tracing::warn!(table = %self.table.name, "View item without payload"),
            }
        }
        Ok(views)
    }
}
