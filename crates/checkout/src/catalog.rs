//! Product catalog port.
//!
//! Checkout only needs a product's current name, SKU, price and whether it
//! is still sold. Catalog management lives elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub active: bool,
}

impl ProductSnapshot {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        sku: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            sku: sku.into(),
            price,
            active: true,
        }
    }
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, product_id: &ProductId) -> Result<Option<ProductSnapshot>>;
}

/// Catalog held in memory, seeded by the server at startup and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, product: ProductSnapshot) {
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product);
    }

    pub async fn deactivate(&self, product_id: &ProductId) {
        if let Some(product) = self.products.write().await.get_mut(product_id) {
            product.active = false;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_product(&self, product_id: &ProductId) -> Result<Option<ProductSnapshot>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_find_and_deactivate() {
        let catalog = InMemoryCatalog::new();
        let id = ProductId::new("lamp");
        assert!(catalog.find_product(&id).await.unwrap().is_none());

        catalog
            .upsert(ProductSnapshot::new("lamp", "Desk Lamp", "LMP-1", Money::from_major(30)))
            .await;
        let found = catalog.find_product(&id).await.unwrap().unwrap();
        assert!(found.active);
        assert_eq!(found.price, Money::from_major(30));

        catalog.deactivate(&id).await;
        assert!(!catalog.find_product(&id).await.unwrap().unwrap().active);
    }
}
