use std::collections::HashMap;

use super::{aggregate::LineItem, inputs::MedicineRequest};
use crate::{
    catalog::{merge_requests, CatalogStore, Medicine, StockRequest},
    errors::Error,
};

/// Line items priced against the catalog, ready to be attached at approval.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PricedOrder {
    pub line_items: Vec<LineItem>,
    pub total_amount: u64,
    pub stock_requests: Vec<StockRequest>,
}

pub fn order_total(line_items: &[LineItem]) -> u64 {
    line_items.iter().map(LineItem::subtotal).sum()
}

/// Resolves every requested medicine and checks stock.
///
/// Fails as a whole: a missing medicine is `NotFound`, a quantity above the
/// current stock is `Conflict`. Repeated medicines are checked on their
/// summed quantity.
pub async fn price_line_items(
    catalog: &dyn CatalogStore,
    requests: &[MedicineRequest],
) -> Result<PricedOrder, Error> {
    if requests.is_empty() {
        return Err(Error::validation("at least one medicine is required"));
    }

    if let Some(zero) = requests.iter().find(|r| r.quantity == 0) {
        return Err(Error::validation(format!(
            "quantity for medicine {} must be at least 1",
            zero.medicine_id
        )));
    }
    let stock_requests = merge_requests(
        &requests
            .iter()
            .map(|r| StockRequest {
                medicine_id: r.medicine_id.clone(),
                quantity: r.quantity,
            })
            .collect::<Vec<_>>(),
    )?;

    let mut medicines: HashMap<&str, Medicine> = HashMap::new();
    for wanted in &stock_requests {
        let medicine = catalog
            .get(&wanted.medicine_id)
            .await?
            .ok_or_else(|| Error::not_found("Medicine", wanted.medicine_id.as_str()))?;
        medicines.insert(wanted.medicine_id.as_str(), medicine);
    }

    for wanted in &stock_requests {
        let medicine = &medicines[wanted.medicine_id.as_str()];
        if medicine.stock < wanted.quantity {
            return Err(Error::insufficient_stock(
                &medicine.name,
                medicine.stock,
                wanted.quantity,
            ));
        }
    }

    let mut line_items = Vec::with_capacity(requests.len());
    let mut total_amount: u64 = 0;
    for request in requests {
        let medicine = &medicines[request.medicine_id.as_str()];
        let unit_price = request.price.unwrap_or(medicine.price);
        total_amount = unit_price
            .checked_mul(u64::from(request.quantity))
            .and_then(|subtotal| total_amount.checked_add(subtotal))
            .ok_or_else(|| Error::validation("order total is out of range"))?;
        line_items.push(LineItem {
            medicine_id: medicine.id.clone(),
            name: medicine.name.clone(),
            quantity: request.quantity,
            unit_price,
        });
    }

    Ok(PricedOrder {
        line_items,
        total_amount,
        stock_requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::MAX_STOCK_ITEMS, store::memory::MemoryCatalogStore};
    use chrono::Utc;

    fn medicine(id: &str, name: &str, price: u64, stock: u32) -> Medicine {
        Medicine {
            id: id.to_string(),
            name: name.to_string(),
            generic_name: None,
            category: None,
            price,
            stock,
            requires_prescription: true,
            expiry_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(id: &str, quantity: u32, price: Option<u64>) -> MedicineRequest {
        MedicineRequest {
            medicine_id: id.to_string(),
            quantity,
            price,
        }
    }

    async fn catalog() -> MemoryCatalogStore {
        let store = MemoryCatalogStore::default();
        store.put(&medicine("m1", "Amoxicillin", 12, 50)).await.unwrap();
        store.put(&medicine("m2", "Cetirizine", 3, 4)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn override_price_wins_over_catalog_price() {
        let store = catalog().await;
        let priced = price_line_items(&store, &[request("m1", 2, Some(10)), request("m2", 3, None)])
            .await
            .unwrap();

        assert_eq!(priced.line_items[0].unit_price, 10);
        assert_eq!(priced.line_items[1].unit_price, 3);
        assert_eq!(priced.total_amount, 2 * 10 + 3 * 3);
        assert_eq!(priced.total_amount, order_total(&priced.line_items));
    }

    #[tokio::test]
    async fn unknown_medicine_fails_whole_request() {
        let store = catalog().await;
        let err = price_line_items(&store, &[request("m1", 1, None), request("nope", 1, None)])
            .await
            .unwrap_err();
        assert_eq!(err, Error::not_found("Medicine", "nope"));
    }

    #[tokio::test]
    async fn insufficient_stock_names_medicine_and_quantities() {
        let store = catalog().await;
        let err = price_line_items(&store, &[request("m1", 100, None)])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Amoxicillin. Available: 50, Requested: 100"
        );
    }

    #[tokio::test]
    async fn repeated_lines_are_checked_on_their_sum() {
        let store = catalog().await;
        let err = price_line_items(&store, &[request("m2", 3, None), request("m2", 2, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn repeated_lines_summing_past_u32_are_invalid() {
        let store = catalog().await;
        let err = price_line_items(&store, &[request("m1", u32::MAX, None), request("m1", 2, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.get("m1").await.unwrap().unwrap().stock, 50);
    }

    #[tokio::test]
    async fn too_many_distinct_medicines_are_invalid() {
        let store = catalog().await;
        let requests: Vec<_> = (0..=MAX_STOCK_ITEMS)
            .map(|i| request(&format!("m{i}"), 1, None))
            .collect();
        let err = price_line_items(&store, &requests).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn zero_quantity_and_empty_requests_are_invalid() {
        let store = catalog().await;
        assert!(matches!(
            price_line_items(&store, &[]).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            price_line_items(&store, &[request("m1", 0, None)]).await,
            Err(Error::Validation { .. })
        ));
    }
}
