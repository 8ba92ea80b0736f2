use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Unit price in minor currency units.
    pub price: u64,
    pub stock: u32,
    #[serde(default)]
    pub requires_prescription: bool,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .generic_name
                .as_deref()
                .is_some_and(|g| g.to_lowercase().contains(needle))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineInput {
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: u64,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub requires_prescription: bool,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// A quantity of one medicine to take from (or return to) stock.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    pub medicine_id: String,
    pub quantity: u32,
}

/// Stock taken by commands whose events are not committed yet, keyed by reservation id.
///
/// The command path records what it took; the caller releases the entry once
/// the commit outcome is known and gives the stock back if the commit failed.
#[derive(Clone, Default)]
pub struct StockReservations {
    held: Arc<Mutex<HashMap<String, Vec<StockRequest>>>>,
}

impl StockReservations {
    pub fn hold(&self, reservation_id: &str, taken: Vec<StockRequest>) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reservation_id.to_string(), taken);
    }

    /// Removes the reservation, returning the stock it holds if any was taken.
    pub fn release(&self, reservation_id: &str) -> Option<Vec<StockRequest>> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(reservation_id)
    }
}

/// Most distinct medicines one stock change may touch. DynamoDB caps a
/// `TransactWriteItems` call at 100 items.
pub const MAX_STOCK_ITEMS: usize = 100;

/// Sums quantities per medicine so each medicine is checked and decremented once.
pub fn merge_requests(requests: &[StockRequest]) -> Result<Vec<StockRequest>, Error> {
    let mut merged: BTreeMap<&str, u32> = BTreeMap::new();
    for request in requests {
        let total = merged.entry(request.medicine_id.as_str()).or_default();
        *total = total.checked_add(request.quantity).ok_or_else(|| {
            Error::validation(format!(
                "requested quantity for medicine {} is out of range",
                request.medicine_id
            ))
        })?;
    }
    if merged.len() > MAX_STOCK_ITEMS {
        return Err(Error::validation(format!(
            "an order may list at most {MAX_STOCK_ITEMS} different medicines"
        )));
    }
    Ok(merged
        .into_iter()
        .map(|(medicine_id, quantity)| StockRequest {
            medicine_id: medicine_id.to_string(),
            quantity,
        })
        .collect())
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Medicine>, Error>;
    async fn list(&self) -> Result<Vec<Medicine>, Error>;
    async fn put(&self, medicine: &Medicine) -> Result<(), Error>;

    /// Decrements every requested medicine, or none of them when any
    /// medicine lacks the requested stock at write time.
    async fn take_stock(&self, requests: &[StockRequest]) -> Result<(), Error>;

    async fn restock(&self, requests: &[StockRequest]) -> Result<(), Error>;
}

pub async fn search(store: &dyn CatalogStore, query: Option<&str>) -> Result<Vec<Medicine>, Error> {
    let mut medicines = store.list().await?;
    if let Some(needle) = query.map(str::trim).filter(|q| !q.is_empty()) {
        let needle = needle.to_lowercase();
        medicines.retain(|m| m.matches(&needle));
    }
    medicines.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(medicines)
}

pub async fn create(store: &dyn CatalogStore, input: MedicineInput) -> Result<Medicine, Error> {
    validate(&input)?;
    let now = Utc::now();
    let medicine = Medicine {
        id: ulid::Ulid::new().to_string(),
        name: input.name.trim().to_string(),
        generic_name: input.generic_name,
        category: input.category,
        price: input.price,
        stock: input.stock,
        requires_prescription: input.requires_prescription,
        expiry_date: input.expiry_date,
        created_at: now,
        updated_at: now,
    };
    store.put(&medicine).await?;
    tracing::info!(medicine_id = %medicine.id, name = %medicine.name, "Medicine added");
    Ok(medicine)
}

pub async fn update(
    store: &dyn CatalogStore,
    id: &str,
    input: MedicineInput,
) -> Result<Medicine, Error> {
    validate(&input)?;
    let existing = store
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("Medicine", id))?;

    let medicine = Medicine {
        name: input.name.trim().to_string(),
        generic_name: input.generic_name,
        category: input.category,
        price: input.price,
        stock: input.stock,
        requires_prescription: input.requires_prescription,
        expiry_date: input.expiry_date,
        updated_at: Utc::now(),
        ..existing
    };
    store.put(&medicine).await?;
    tracing::info!(medicine_id = %medicine.id, stock = medicine.stock, "Medicine updated");
    Ok(medicine)
}

fn validate(input: &MedicineInput) -> Result<(), Error> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("medicine name is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCatalogStore;

    fn input(name: &str, generic: Option<&str>, stock: u32) -> MedicineInput {
        MedicineInput {
            name: name.to_string(),
            generic_name: generic.map(str::to_string),
            category: None,
            price: 10,
            stock,
            requires_prescription: true,
            expiry_date: None,
        }
    }

    #[test]
    fn merge_requests_sums_repeated_medicines() {
        let merged = merge_requests(&[
            StockRequest { medicine_id: "m2".into(), quantity: 1 },
            StockRequest { medicine_id: "m1".into(), quantity: 30 },
            StockRequest { medicine_id: "m1".into(), quantity: 30 },
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![
                StockRequest { medicine_id: "m1".into(), quantity: 60 },
                StockRequest { medicine_id: "m2".into(), quantity: 1 },
            ]
        );
    }

    #[test]
    fn merge_requests_rejects_quantities_that_overflow() {
        let err = merge_requests(&[
            StockRequest { medicine_id: "m1".into(), quantity: u32::MAX },
            StockRequest { medicine_id: "m1".into(), quantity: 2 },
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn merge_requests_caps_distinct_medicines() {
        let at_cap: Vec<_> = (0..MAX_STOCK_ITEMS)
            .map(|i| StockRequest { medicine_id: format!("m{i}"), quantity: 1 })
            .collect();
        assert_eq!(merge_requests(&at_cap).unwrap().len(), MAX_STOCK_ITEMS);

        let mut over = at_cap.clone();
        over.push(StockRequest { medicine_id: "m-extra".into(), quantity: 1 });
        over.push(StockRequest { medicine_id: "m0".into(), quantity: 1 });
        assert!(matches!(merge_requests(&over), Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn search_matches_name_and_generic_name_case_insensitively() {
        let store = MemoryCatalogStore::default();
        create(&store, input("Zyrtec", Some("Cetirizine"), 5)).await.unwrap();
        create(&store, input("Amoxil", Some("Amoxicillin"), 5)).await.unwrap();
        create(&store, input("Crocin", Some("Paracetamol"), 5)).await.unwrap();

        let all = search(&store, None).await.unwrap();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Amoxil", "Crocin", "Zyrtec"]);

        let found = search(&store, Some("CETIRI")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Zyrtec");
    }

    #[tokio::test]
    async fn take_stock_is_all_or_nothing() {
        let store = MemoryCatalogStore::default();
        let a = create(&store, input("A", None, 5)).await.unwrap();
        let b = create(&store, input("B", None, 1)).await.unwrap();

        let err = store
            .take_stock(&[
                StockRequest { medicine_id: a.id.clone(), quantity: 3 },
                StockRequest { medicine_id: b.id.clone(), quantity: 2 },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(store.get(&b.id).await.unwrap().unwrap().stock, 1);

        store
            .take_stock(&[StockRequest { medicine_id: a.id.clone(), quantity: 3 }])
            .await
            .unwrap();
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().stock, 2);

        store
            .restock(&[StockRequest { medicine_id: a.id.clone(), quantity: 3 }])
            .await
            .unwrap();
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn update_unknown_medicine_is_not_found() {
        let store = MemoryCatalogStore::default();
        let err = update(&store, "missing", input("A", None, 1)).await.unwrap_err();
        assert_eq!(err, Error::not_found("Medicine", "missing"));
    }
}
