//! Per-user cart storage and the cart operations exposed to clients.

use std::collections::HashMap;
use std::sync::Arc;

use common::UserId;
use domain::{
    Cart, CartError, CartItem, CartItemId, CouponBook, MAX_LINE_QUANTITY, ProductId, Variant,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::catalog::ProductCatalog;
use crate::error::{CheckoutError, Result};
use crate::inventory::InventoryLedger;

/// Holds one cart per user behind its own lock. Checkout takes the same
/// lock, so a cart cannot change while it is being turned into an order.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<RwLock<HashMap<UserId, Arc<Mutex<Cart>>>>>,
    catalog: Arc<dyn ProductCatalog>,
    ledger: Arc<dyn InventoryLedger>,
    coupons: Arc<CouponBook>,
}

impl CartService {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        ledger: Arc<dyn InventoryLedger>,
        coupons: CouponBook,
    ) -> Self {
        Self {
            carts: Arc::default(),
            catalog,
            ledger,
            coupons: Arc::new(coupons),
        }
    }

    /// Locks the user's cart, creating it on first access.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<Cart> {
        let existing = self.carts.read().await.get(&user_id).cloned();
        let handle = match existing {
            Some(handle) => handle,
            None => self
                .carts
                .write()
                .await
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(Cart::new(user_id))))
                .clone(),
        };
        handle.lock_owned().await
    }

    pub async fn get_cart(&self, user_id: UserId) -> Cart {
        self.lock(user_id).await.clone()
    }

    /// Adds a product at its current catalog price.
    #[tracing::instrument(skip(self, variant))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        variant: Option<Variant>,
    ) -> Result<Cart> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity.into());
        }
        let product = self
            .catalog
            .find_product(&product_id)
            .await?
            .filter(|p| p.active)
            .ok_or(CheckoutError::NotFound { what: "product" })?;

        let mut cart = self.lock(user_id).await;
        let wanted = cart.quantity_of(&product_id).saturating_add(quantity);
        self.check_stock(&product_id, &product.name, wanted).await?;

        cart.add_item(
            CartItem::new(product_id, product.name, product.sku, quantity, product.price)
                .with_variant(variant),
        )?;
        Ok(cart.clone())
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity.into());
        }
        let mut cart = self.lock(user_id).await;
        let item = cart
            .item(item_id)
            .cloned()
            .ok_or(CheckoutError::NotFound { what: "cart item" })?;

        if quantity > item.quantity {
            let wanted = (cart.quantity_of(&item.product_id) - item.quantity).saturating_add(quantity);
            self.check_stock(&item.product_id, &item.name, wanted).await?;
        }

        cart.update_quantity(item_id, quantity)?;
        Ok(cart.clone())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_cart_item(&self, user_id: UserId, item_id: CartItemId) -> Result<Cart> {
        let mut cart = self.lock(user_id).await;
        cart.remove_item(item_id)?;
        Ok(cart.clone())
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Cart {
        let mut cart = self.lock(user_id).await;
        cart.clear();
        cart.clone()
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: UserId, code: &str) -> Result<Cart> {
        let mut cart = self.lock(user_id).await;
        cart.apply_coupon(code, &self.coupons)?;
        Ok(cart.clone())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: UserId) -> Cart {
        let mut cart = self.lock(user_id).await;
        cart.remove_coupon();
        cart.clone()
    }

    /// Advisory check against current stock. The binding check happens when
    /// the order is placed.
    async fn check_stock(&self, product_id: &ProductId, name: &str, wanted: u32) -> Result<()> {
        match self.ledger.record(product_id).await? {
            Some(record) if !record.can_supply(wanted) => Err(CheckoutError::InsufficientStock {
                product: name.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::Money;

    use super::*;
    use crate::catalog::{InMemoryCatalog, ProductSnapshot};
    use crate::error::ErrorKind;
    use crate::inventory::{InMemoryInventoryLedger, InventoryRecord};

    async fn service() -> CartService {
        let catalog = InMemoryCatalog::new();
        catalog
            .upsert(ProductSnapshot::new("lamp", "Desk Lamp", "LMP-1", Money::from_major(40)))
            .await;
        catalog
            .upsert(ProductSnapshot::new("mug", "Mug", "MUG-1", Money::from_major(100)))
            .await;
        catalog
            .upsert(ProductSnapshot::new("ebook", "Field Guide", "EBK-1", Money::from_major(5)))
            .await;
        let mut retired = ProductSnapshot::new("old", "Old Thing", "OLD-1", Money::from_major(1));
        retired.active = false;
        catalog.upsert(retired).await;

        let ledger = InMemoryInventoryLedger::new();
        ledger.set_record(InventoryRecord::tracked("lamp", 3)).await.unwrap();
        ledger.set_record(InventoryRecord::tracked("mug", 50)).await.unwrap();

        CartService::new(Arc::new(catalog), Arc::new(ledger), CouponBook::default())
    }

    #[tokio::test]
    async fn cart_is_created_lazily() {
        let service = service().await;
        let user = UserId::new();
        let cart = service.get_cart(user).await;
        assert!(cart.is_empty());
        assert_eq!(cart.user_id(), user);
    }

    #[tokio::test]
    async fn add_snapshots_catalog_price_and_merges() {
        let service = service().await;
        let user = UserId::new();

        service
            .add_to_cart(user, ProductId::new("lamp"), 1, None)
            .await
            .unwrap();
        let cart = service
            .add_to_cart(user, ProductId::new("lamp"), 1, None)
            .await
            .unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.items()[0].unit_price, Money::from_major(40));
        assert_eq!(cart.items()[0].name, "Desk Lamp");
        assert_eq!(cart.subtotal(), Money::from_major(80));
    }

    #[tokio::test]
    async fn unknown_or_inactive_products_are_not_found() {
        let service = service().await;
        let user = UserId::new();
        for id in ["ghost", "old"] {
            let err = service
                .add_to_cart(user, ProductId::new(id), 1, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }

    #[tokio::test]
    async fn advisory_stock_check_counts_existing_quantity() {
        let service = service().await;
        let user = UserId::new();
        service
            .add_to_cart(user, ProductId::new("lamp"), 2, None)
            .await
            .unwrap();

        let err = service
            .add_to_cart(user, ProductId::new("lamp"), 2, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(service.get_cart(user).await.items()[0].quantity, 2);
    }

    #[tokio::test]
    async fn update_checks_stock_and_validates_quantity() {
        let service = service().await;
        let user = UserId::new();
        let cart = service
            .add_to_cart(user, ProductId::new("lamp"), 1, None)
            .await
            .unwrap();
        let item_id = cart.items()[0].item_id;

        let cart = service.update_cart_item(user, item_id, 3).await.unwrap();
        assert_eq!(cart.items()[0].quantity, 3);

        let err = service.update_cart_item(user, item_id, 4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err = service.update_cart_item(user, item_id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .update_cart_item(user, CartItemId::new(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn coupons_and_clear() {
        let service = service().await;
        let user = UserId::new();

        let err = service.apply_coupon(user, "SAVE10").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CartEmpty);

        service
            .add_to_cart(user, ProductId::new("mug"), 2, None)
            .await
            .unwrap();
        let cart = service.apply_coupon(user, "SAVE10").await.unwrap();
        assert_eq!(cart.totals().final_amount, Money::from_major(180));

        let err = service.apply_coupon(user, "BOGUS").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCoupon);
        assert_eq!(service.get_cart(user).await.discount(), Money::from_major(20));

        let cart = service.remove_coupon(user).await;
        assert_eq!(cart.discount(), Money::zero());

        let item_id = cart.items()[0].item_id;
        let cart = service.remove_cart_item(user, item_id).await.unwrap();
        assert!(cart.is_empty());

        service
            .add_to_cart(user, ProductId::new("mug"), 1, None)
            .await
            .unwrap();
        assert!(service.clear_cart(user).await.is_empty());
    }

    #[tokio::test]
    async fn huge_quantities_of_untracked_products_are_rejected() {
        let service = service().await;
        let user = UserId::new();

        let err = service
            .add_to_cart(
                user,
                ProductId::new("ebook"),
                u32::MAX,
                Some(Variant::new("format", "pdf")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.fields()[0].field, "quantity");

        let cart = service
            .add_to_cart(
                user,
                ProductId::new("ebook"),
                MAX_LINE_QUANTITY,
                Some(Variant::new("format", "pdf")),
            )
            .await
            .unwrap();
        let item_id = cart.items()[0].item_id;
        let cart = service
            .add_to_cart(
                user,
                ProductId::new("ebook"),
                2,
                Some(Variant::new("format", "epub")),
            )
            .await
            .unwrap();
        assert_eq!(cart.totals().total_items, MAX_LINE_QUANTITY + 2);

        let err = service
            .update_cart_item(user, item_id, u32::MAX)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn carts_are_per_user() {
        let service = service().await;
        let alice = UserId::new();
        let bob = UserId::new();
        service
            .add_to_cart(alice, ProductId::new("mug"), 1, None)
            .await
            .unwrap();
        assert!(service.get_cart(bob).await.is_empty());
    }
}
