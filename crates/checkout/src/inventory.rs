//! Inventory ledger.
//!
//! Stock is decremented at checkout in a single check-then-decrement step
//! that is serialized per product: either every line of an order is taken
//! or none is. Releases put stock back after a failed checkout or a
//! cancellation. Products are always touched in ascending id order so two
//! multi-product orders cannot deadlock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{OrderLine, ProductId};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::{Mutex, RwLock};

use crate::error::{CheckoutError, Result};

/// Default quantity at or below which a product counts as low on stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub quantity: u32,
    pub low_stock_threshold: u32,
    /// Untracked products never run out.
    pub track_quantity: bool,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn tracked(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            track_quantity: true,
            updated_at: Utc::now(),
        }
    }

    pub fn untracked(product_id: impl Into<ProductId>) -> Self {
        Self {
            track_quantity: false,
            ..Self::tracked(product_id, 0)
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn stock_status(&self) -> StockStatus {
        if !self.track_quantity {
            StockStatus::InStock
        } else if self.quantity == 0 {
            StockStatus::OutOfStock
        } else if self.quantity <= self.low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Whether `quantity` more units can be taken right now.
    pub fn can_supply(&self, quantity: u32) -> bool {
        !self.track_quantity || self.quantity >= quantity
    }
}

/// Units of one product to take or give back. `name` is used in
/// insufficient-stock errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            quantity,
        }
    }
}

impl From<&OrderLine> for StockLine {
    fn from(line: &OrderLine) -> Self {
        Self::new(line.product_id.clone(), line.name.clone(), line.quantity)
    }
}

/// Sums lines per product, ordered by product id.
pub(crate) fn merge_lines(lines: &[StockLine]) -> BTreeMap<ProductId, (String, u32)> {
    let mut merged: BTreeMap<ProductId, (String, u32)> = BTreeMap::new();
    for line in lines {
        let entry = merged
            .entry(line.product_id.clone())
            .or_insert_with(|| (line.name.clone(), 0));
        entry.1 = entry.1.saturating_add(line.quantity);
    }
    merged
}

/// Per-product quantity store. Products without a record are not tracked.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Takes every line or nothing. Fails with `InsufficientStock` naming the
    /// first product (in id order) that cannot be supplied.
    async fn reserve(&self, lines: &[StockLine]) -> Result<()>;

    /// Gives stock back to tracked products.
    async fn release(&self, lines: &[StockLine]) -> Result<()>;

    async fn record(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Creates or replaces a product's stock settings.
    async fn set_record(&self, record: InventoryRecord) -> Result<InventoryRecord>;
}

/// In-memory ledger with one async mutex per product.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    records: Arc<RwLock<HashMap<ProductId, Arc<Mutex<InventoryRecord>>>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles for the given products in ascending id order, skipping
    /// products the ledger does not know.
    async fn handles<'a>(
        &self,
        ids: impl Iterator<Item = &'a ProductId>,
    ) -> Vec<(ProductId, Arc<Mutex<InventoryRecord>>)> {
        let records = self.records.read().await;
        ids.filter_map(|id| records.get(id).map(|h| (id.clone(), h.clone())))
            .collect()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn reserve(&self, lines: &[StockLine]) -> Result<()> {
        let merged = merge_lines(lines);
        let handles = self.handles(merged.keys()).await;

        let mut guards = Vec::with_capacity(handles.len());
        for (product_id, handle) in &handles {
            guards.push((product_id, handle.lock().await));
        }

        for (product_id, record) in &guards {
            let (name, wanted) = &merged[*product_id];
            if !record.can_supply(*wanted) {
                tracing::warn!(%product_id, wanted, available = record.quantity, "insufficient stock");
                return Err(CheckoutError::InsufficientStock {
                    product: name.clone(),
                });
            }
        }

        let now = Utc::now();
        for (product_id, record) in &mut guards {
            if record.track_quantity {
                record.quantity -= merged[*product_id].1;
                record.updated_at = now;
            }
        }

        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn release(&self, lines: &[StockLine]) -> Result<()> {
        let merged = merge_lines(lines);
        let handles = self.handles(merged.keys()).await;

        let now = Utc::now();
        for (product_id, handle) in &handles {
            let mut record = handle.lock().await;
            if record.track_quantity {
                record.quantity = record.quantity.saturating_add(merged[product_id].1);
                record.updated_at = now;
            }
        }
        Ok(())
    }

    async fn record(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let handle = self.records.read().await.get(product_id).cloned();
        match handle {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn set_record(&self, mut record: InventoryRecord) -> Result<InventoryRecord> {
        record.updated_at = Utc::now();
        let existing = self.records.read().await.get(&record.product_id).cloned();
        match existing {
            Some(handle) => *handle.lock().await = record.clone(),
            None => {
                self.records
                    .write()
                    .await
                    .entry(record.product_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(record.clone())));
            }
        }
        Ok(record)
    }
}

/// Narrows a stored count, rejecting rows that no valid write could produce.
fn column_to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| CheckoutError::Internal(format!("inventory {column} out of range: {value}")))
}

/// PostgreSQL ledger. Each product is a single conditional `UPDATE`, and all
/// products of an order share one transaction.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: sqlx::postgres::PgRow) -> Result<InventoryRecord> {
        let quantity: i64 = row.try_get("quantity")?;
        let threshold: i64 = row.try_get("low_stock_threshold")?;
        Ok(InventoryRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: column_to_u32("quantity", quantity)?,
            low_stock_threshold: column_to_u32("low_stock_threshold", threshold)?,
            track_quantity: row.try_get("track_quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn reserve(&self, lines: &[StockLine]) -> Result<()> {
        let merged = merge_lines(lines);
        let mut tx = self.pool.begin().await?;

        for (product_id, (name, wanted)) in &merged {
            let updated: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE inventory
                SET quantity = quantity - $2, updated_at = NOW()
                WHERE product_id = $1 AND track_quantity AND quantity >= $2
                RETURNING quantity
                "#,
            )
            .bind(product_id.as_str())
            .bind(i64::from(*wanted))
            .fetch_optional(&mut *tx)
            .await?;

            if updated.is_some() {
                continue;
            }

            // No row changed: either the product is not tracked or it is short.
            let tracked: Option<bool> =
                sqlx::query_scalar("SELECT track_quantity FROM inventory WHERE product_id = $1")
                    .bind(product_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
            if tracked == Some(true) {
                tx.rollback().await?;
                tracing::warn!(%product_id, wanted, "insufficient stock");
                return Err(CheckoutError::InsufficientStock {
                    product: name.clone(),
                });
            }
        }

        tx.commit().await?;
        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn release(&self, lines: &[StockLine]) -> Result<()> {
        let merged = merge_lines(lines);
        let mut tx = self.pool.begin().await?;

        for (product_id, (_, quantity)) in &merged {
            sqlx::query(
                r#"
                UPDATE inventory
                SET quantity = quantity + $2, updated_at = NOW()
                WHERE product_id = $1 AND track_quantity
                "#,
            )
            .bind(product_id.as_str())
            .bind(i64::from(*quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(
            "SELECT product_id, quantity, low_stock_threshold, track_quantity, updated_at \
             FROM inventory WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn set_record(&self, record: InventoryRecord) -> Result<InventoryRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO inventory (product_id, quantity, low_stock_threshold, track_quantity, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                track_quantity = EXCLUDED.track_quantity,
                updated_at = EXCLUDED.updated_at
            RETURNING product_id, quantity, low_stock_threshold, track_quantity, updated_at
            "#,
        )
        .bind(record.product_id.as_str())
        .bind(i64::from(record.quantity))
        .bind(i64::from(record.low_stock_threshold))
        .bind(record.track_quantity)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger_with(records: Vec<InventoryRecord>) -> InMemoryInventoryLedger {
        let ledger = InMemoryInventoryLedger::new();
        for record in records {
            ledger.set_record(record).await.unwrap();
        }
        ledger
    }

    async fn quantity(ledger: &InMemoryInventoryLedger, id: &str) -> u32 {
        ledger
            .record(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[test]
    fn stock_status_thresholds() {
        assert_eq!(InventoryRecord::tracked("a", 0).stock_status(), StockStatus::OutOfStock);
        assert_eq!(InventoryRecord::tracked("a", 10).stock_status(), StockStatus::LowStock);
        assert_eq!(InventoryRecord::tracked("a", 11).stock_status(), StockStatus::InStock);
        assert_eq!(
            InventoryRecord::tracked("a", 3).with_threshold(2).stock_status(),
            StockStatus::InStock
        );
        assert_eq!(InventoryRecord::untracked("a").stock_status(), StockStatus::InStock);
        assert_eq!(
            serde_json::to_string(&StockStatus::OutOfStock).unwrap(),
            "\"out-of-stock\""
        );
    }

    #[test]
    fn merge_sums_per_product_in_id_order() {
        let merged = merge_lines(&[
            StockLine::new("b", "Bee", 1),
            StockLine::new("a", "Ant", 2),
            StockLine::new("b", "Bee", 3),
        ]);
        let flat: Vec<_> = merged.iter().map(|(id, (_, q))| (id.as_str(), *q)).collect();
        assert_eq!(flat, [("a", 2), ("b", 4)]);
    }

    #[test]
    fn merge_saturates_instead_of_overflowing() {
        let merged = merge_lines(&[
            StockLine::new("a", "Ant", u32::MAX),
            StockLine::new("a", "Ant", 2),
        ]);
        assert_eq!(merged[&ProductId::new("a")].1, u32::MAX);
    }

    #[test]
    fn corrupt_counts_are_internal_errors() {
        assert_eq!(column_to_u32("quantity", 7).unwrap(), 7);
        for (column, value) in [("quantity", -1), ("low_stock_threshold", -5)] {
            let err = column_to_u32(column, value).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
            assert!(err.to_string().contains(column));
        }
        assert!(column_to_u32("low_stock_threshold", i64::from(u32::MAX) + 1).is_err());
    }

    #[tokio::test]
    async fn reserve_and_release() {
        let ledger = ledger_with(vec![InventoryRecord::tracked("lamp", 10)]).await;

        ledger.reserve(&[StockLine::new("lamp", "Lamp", 3)]).await.unwrap();
        assert_eq!(quantity(&ledger, "lamp").await, 7);

        ledger.release(&[StockLine::new("lamp", "Lamp", 3)]).await.unwrap();
        assert_eq!(quantity(&ledger, "lamp").await, 10);
    }

    #[tokio::test]
    async fn shortage_on_one_line_takes_nothing() {
        let ledger = ledger_with(vec![
            InventoryRecord::tracked("a", 5),
            InventoryRecord::tracked("b", 1),
        ])
        .await;

        let err = ledger
            .reserve(&[StockLine::new("a", "Apple", 2), StockLine::new("b", "Banana", 2)])
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InsufficientStock { ref product } if product == "Banana"));
        assert_eq!(quantity(&ledger, "a").await, 5);
        assert_eq!(quantity(&ledger, "b").await, 1);
    }

    #[tokio::test]
    async fn variants_of_one_product_share_stock() {
        let ledger = ledger_with(vec![InventoryRecord::tracked("tee", 3)]).await;
        let result = ledger
            .reserve(&[StockLine::new("tee", "Tee", 2), StockLine::new("tee", "Tee", 2)])
            .await;
        assert!(result.is_err());
        assert_eq!(quantity(&ledger, "tee").await, 3);
    }

    #[tokio::test]
    async fn untracked_and_unknown_products_always_supply() {
        let ledger = ledger_with(vec![InventoryRecord::untracked("ebook")]).await;
        ledger
            .reserve(&[
                StockLine::new("ebook", "E-book", 1_000),
                StockLine::new("gift-card", "Gift card", 5),
            ])
            .await
            .unwrap();
        assert_eq!(quantity(&ledger, "ebook").await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_oversell() {
        let ledger = ledger_with(vec![InventoryRecord::tracked("hot", 5)]).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&[StockLine::new("hot", "Hot item", 1)]).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 5);
        assert_eq!(quantity(&ledger, "hot").await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_order_multi_product_reservations_do_not_deadlock() {
        let ledger = ledger_with(vec![
            InventoryRecord::tracked("x", 100),
            InventoryRecord::tracked("y", 100),
        ])
        .await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = ledger.clone();
            let lines = if i % 2 == 0 {
                vec![StockLine::new("x", "X", 1), StockLine::new("y", "Y", 1)]
            } else {
                vec![StockLine::new("y", "Y", 1), StockLine::new("x", "X", 1)]
            };
            handles.push(tokio::spawn(async move { ledger.reserve(&lines).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(quantity(&ledger, "x").await, 50);
        assert_eq!(quantity(&ledger, "y").await, 50);
    }

    #[tokio::test]
    async fn set_record_replaces_settings() {
        let ledger = ledger_with(vec![InventoryRecord::tracked("a", 5)]).await;
        let updated = ledger
            .set_record(InventoryRecord::tracked("a", 40).with_threshold(5))
            .await
            .unwrap();
        assert_eq!(updated.quantity, 40);
        assert_eq!(
            ledger.record(&ProductId::new("a")).await.unwrap().unwrap().low_stock_threshold,
            5
        );
    }
}
