use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use cqrs_es::{
    persist::{PersistenceError, ViewContext, ViewRepository},
    Aggregate, View,
};
use tokio::sync::RwLock;

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

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, Error> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>, Error> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.role == role)
            .cloned()
            .collect())
    }

    async fn put(&self, account: &Account) -> Result<(), Error> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.accounts.write().await.remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    medicines: RwLock<HashMap<String, Medicine>>,
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get(&self, id: &str) -> Result<Option<Medicine>, Error> {
        Ok(self.medicines.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Medicine>, Error> {
        Ok(self.medicines.read().await.values().cloned().collect())
    }

    async fn put(&self, medicine: &Medicine) -> Result<(), Error> {
        self.medicines
            .write()
            .await
            .insert(medicine.id.clone(), medicine.clone());
        Ok(())
    }

    async fn take_stock(&self, requests: &[StockRequest]) -> Result<(), Error> {
        let requests = merge_requests(requests)?;
        let mut medicines = self.medicines.write().await;

        for request in &requests {
            let medicine = medicines
                .get(&request.medicine_id)
                .ok_or_else(|| Error::not_found("Medicine", request.medicine_id.as_str()))?;
            if medicine.stock < request.quantity {
                return Err(Error::insufficient_stock(
                    &medicine.name,
                    medicine.stock,
                    request.quantity,
                ));
            }
        }

        let now = Utc::now();
        for request in &requests {
            if let Some(medicine) = medicines.get_mut(&request.medicine_id) {
                medicine.stock -= request.quantity;
                medicine.updated_at = now;
            }
        }
        Ok(())
    }

    async fn restock(&self, requests: &[StockRequest]) -> Result<(), Error> {
        let mut medicines = self.medicines.write().await;
        let now = Utc::now();
        for request in merge_requests(requests)? {
            if let Some(medicine) = medicines.get_mut(&request.medicine_id) {
                medicine.stock = medicine.stock.saturating_add(request.quantity);
                medicine.updated_at = now;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRelationshipStore {
    relations: RwLock<HashMap<(String, String), DoctorPatient>>,
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn get(&self, doctor_id: &str, patient_id: &str) -> Result<Option<DoctorPatient>, Error> {
        Ok(self
            .relations
            .read()
            .await
            .get(&(doctor_id.to_string(), patient_id.to_string()))
            .cloned())
    }

    async fn put(&self, relation: &DoctorPatient) -> Result<(), Error> {
        self.relations.write().await.insert(
            (relation.doctor_id.clone(), relation.patient_id.clone()),
            relation.clone(),
        );
        Ok(())
    }

    async fn list_for_doctor(&self, doctor_id: &str) -> Result<Vec<DoctorPatient>, Error> {
        Ok(self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn list_for_patient(&self, patient_id: &str) -> Result<Vec<DoctorPatient>, Error> {
        Ok(self
            .relations
            .read()
            .await
            .values()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, doctor_id: &str, patient_id: &str) -> Result<(), Error> {
        self.relations
            .write()
            .await
            .remove(&(doctor_id.to_string(), patient_id.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    packages: RwLock<HashMap<String, DeliveryPackage>>,
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn insert_if_absent(&self, package: &DeliveryPackage) -> Result<bool, Error> {
        let mut packages = self.packages.write().await;
        if packages.values().any(|p| p.order_id == package.order_id) {
            return Ok(false);
        }
        packages.insert(package.id.clone(), package.clone());
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<DeliveryPackage>, Error> {
        Ok(self.packages.read().await.get(id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<DeliveryPackage>, Error> {
        Ok(self
            .packages
            .read()
            .await
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<DeliveryPackage>, Error> {
        Ok(self.packages.read().await.values().cloned().collect())
    }

    async fn put(&self, package: &DeliveryPackage) -> Result<(), Error> {
        self.packages
            .write()
            .await
            .insert(package.id.clone(), package.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    notifications: RwLock<HashMap<String, Notification>>,
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn put(&self, notification: &Notification) -> Result<(), Error> {
        self.notifications
            .write()
            .await
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Notification>, Error> {
        Ok(self.notifications.read().await.get(id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>, Error> {
        Ok(self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.notifications.write().await.remove(id);
        Ok(())
    }
}

/// Expired entries are purged lazily on read.
#[derive(Debug, Default)]
pub struct MemoryExpiringStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

#[async_trait]
impl ExpiringStore for MemoryExpiringStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// View repository with the same optimistic versioning as the DynamoDB one.
#[derive(Debug)]
pub struct MemoryViewStore<V> {
    views: RwLock<HashMap<String, (V, i64)>>,
}

impl<V> Default for MemoryViewStore<V> {
    fn default() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<V, A> ViewRepository<V, A> for MemoryViewStore<V>
where
    V: View<A> + Clone,
    A: Aggregate,
{
    async fn load(&self, view_id: &str) -> Result<Option<V>, PersistenceError> {
        Ok(self
            .views
            .read()
            .await
            .get(view_id)
            .map(|(view, _)| view.clone()))
    }

    async fn load_with_context(
        &self,
        view_id: &str,
    ) -> Result<Option<(V, ViewContext)>, PersistenceError> {
        Ok(self
            .views
            .read()
            .await
            .get(view_id)
            .map(|(view, version)| (view.clone(), ViewContext::new(view_id.to_string(), *version))))
    }

    async fn update_view(&self, view: V, context: ViewContext) -> Result<(), PersistenceError> {
        let mut views = self.views.write().await;
        let current = views
            .get(&context.view_instance_id)
            .map_or(0, |(_, version)| *version);
        if current != context.version {
            return Err(PersistenceError::OptimisticLockError);
        }
        views.insert(context.view_instance_id, (view, context.version + 1));
        Ok(())
    }
}

#[async_trait]
impl<V, A> ViewStore<V, A> for MemoryViewStore<V>
where
    V: View<A> + Clone,
    A: Aggregate,
{
    async fn list(&self) -> Result<Vec<V>, Error> {
        Ok(self
            .views
            .read()
            .await
            .values()
            .map(|(view, _)| view.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::{Appointment, View as AppointmentView};

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryExpiringStore::default();
        store.put("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.put("gone", "v", Duration::ZERO).await.unwrap();
        assert!(store.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_view_context_is_rejected() {
        let store: MemoryViewStore<AppointmentView> = MemoryViewStore::default();
        let context = ViewContext::new("a1".to_string(), 0);
        ViewRepository::<AppointmentView, Appointment>::update_view(
            &store,
            AppointmentView::default(),
            context,
        )
        .await
        .unwrap();

        let stale = ViewContext::new("a1".to_string(), 0);
        let err = ViewRepository::<AppointmentView, Appointment>::update_view(
            &store,
            AppointmentView::default(),
            stale,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PersistenceError::OptimisticLockError));

        let views = ViewStore::<AppointmentView, Appointment>::list(&store).await.unwrap();
        assert_eq!(views.len(), 1);
    }
}
