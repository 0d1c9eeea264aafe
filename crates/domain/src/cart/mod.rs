//! Shopping cart with derived totals.
//!
//! A cart is plain mutable state owned by one user. Every mutation goes
//! through a method on [`Cart`] that recomputes [`CartTotals`], so totals are
//! never supplied by a caller.

mod coupon;

pub use coupon::{Coupon, CouponBook, CouponKind};

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::Money;
use crate::order::ProductId;

/// Errors raised by cart mutations. A failed mutation leaves the cart unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart is empty")]
    CartEmpty,

    #[error("invalid coupon code: {0}")]
    InvalidCoupon(String),

    #[error("cart item not found: {0}")]
    ItemNotFound(CartItemId),

    #[error("quantity must be between 1 and {}", MAX_LINE_QUANTITY)]
    InvalidQuantity,
}

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

fn valid_quantity(quantity: u32) -> bool {
    (1..=MAX_LINE_QUANTITY).contains(&quantity)
}

/// Identifier of a line inside a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(Uuid);

impl CartItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CartItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CartItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product variant such as `size: M`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub option: String,
}

impl Variant {
    pub fn new(name: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            option: option.into(),
        }
    }
}

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub variant: Option<Variant>,
    /// Price captured when the product was first added.
    pub unit_price: Money,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        sku: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            item_id: CartItemId::new(),
            product_id: product_id.into(),
            name: name.into(),
            sku: sku.into(),
            quantity,
            variant: None,
            unit_price,
        }
    }

    pub fn with_variant(mut self, variant: Option<Variant>) -> Self {
        self.variant = variant;
        self
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn same_line_as(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id && self.variant == other.variant
    }
}

/// Totals derived from the items and the applied coupon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub total_items: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub final_amount: Money,
}

impl CartTotals {
    /// Pure totals computation: `final = subtotal - discount`, with the
    /// discount clamped to `[0, subtotal]`.
    pub fn compute(items: &[CartItem], coupon: Option<&Coupon>) -> Self {
        let total_items = items
            .iter()
            .fold(0u32, |acc, i| acc.saturating_add(i.quantity));
        let subtotal: Money = items.iter().map(CartItem::line_total).sum();
        let discount = coupon.map_or(Money::zero(), |c| c.discount_for(subtotal));

        Self {
            total_items,
            subtotal,
            discount,
            final_amount: subtotal - discount,
        }
    }
}

/// A user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartItem>,
    coupon: Option<Coupon>,
    totals: CartTotals,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            coupon: None,
            totals: CartTotals::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    pub fn subtotal(&self) -> Money {
        self.totals.subtotal
    }

    pub fn discount(&self) -> Money {
        self.totals.discount
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Units of `product_id` across all variants.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .filter(|i| &i.product_id == product_id)
            .fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }

    /// Adds a line, merging into an existing line with the same product and
    /// variant. A merged line keeps its original id and price snapshot, and
    /// may not grow past [`MAX_LINE_QUANTITY`].
    pub fn add_item(&mut self, item: CartItem) -> Result<CartItemId, CartError> {
        if !valid_quantity(item.quantity) {
            return Err(CartError::InvalidQuantity);
        }

        let id = match self.items.iter_mut().find(|i| i.same_line_as(&item)) {
            Some(existing) => {
                let merged = existing.quantity.saturating_add(item.quantity);
                if !valid_quantity(merged) {
                    return Err(CartError::InvalidQuantity);
                }
                existing.quantity = merged;
                existing.item_id
            }
            None => {
                let id = item.item_id;
                self.items.push(item);
                id
            }
        };

        self.touch();
        Ok(id)
    }

    pub fn update_quantity(&mut self, item_id: CartItemId, quantity: u32) -> Result<(), CartError> {
        if !valid_quantity(quantity) {
            return Err(CartError::InvalidQuantity);
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.item_id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        item.quantity = quantity;

        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: CartItemId) -> Result<CartItem, CartError> {
        let index = self
            .items
            .iter()
            .position(|i| i.item_id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        let removed = self.items.remove(index);

        self.touch();
        Ok(removed)
    }

    /// Empties the cart and drops the coupon.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
        self.touch();
    }

    /// Applies `code`, replacing any coupon already on the cart.
    pub fn apply_coupon(&mut self, code: &str, book: &CouponBook) -> Result<(), CartError> {
        let coupon = book
            .lookup(code)
            .ok_or_else(|| CartError::InvalidCoupon(code.trim().to_string()))?;
        if self.items.is_empty() {
            return Err(CartError::CartEmpty);
        }

        self.coupon = Some(coupon);
        self.touch();
        Ok(())
    }

    pub fn remove_coupon(&mut self) {
        self.coupon = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.totals = CartTotals::compute(&self.items, self.coupon.as_ref());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(quantity: u32, cents: i64) -> CartItem {
        CartItem::new("prod-widget", "Widget", "WID-1", quantity, Money::from_cents(cents))
    }

    #[test]
    fn new_cart_is_empty_with_zero_totals() {
        let cart = Cart::new(UserId::new());
        assert!(cart.is_empty());
        assert_eq!(cart.totals(), CartTotals::default());
    }

    #[test]
    fn same_product_and_variant_merges() {
        let mut cart = Cart::new(UserId::new());
        let first = cart
            .add_item(widget(1, 1000).with_variant(Some(Variant::new("size", "M"))))
            .unwrap();
        let second = cart
            .add_item(widget(2, 1200).with_variant(Some(Variant::new("size", "M"))))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(cart.items()[0].unit_price, Money::from_cents(1000));
        assert_eq!(cart.totals().total_items, 3);
        assert_eq!(cart.subtotal(), Money::from_cents(3000));
    }

    #[test]
    fn different_variants_stay_separate() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 1000).with_variant(Some(Variant::new("size", "M"))))
            .unwrap();
        cart.add_item(widget(1, 1000).with_variant(Some(Variant::new("size", "L"))))
            .unwrap();
        cart.add_item(widget(1, 1000)).unwrap();

        assert_eq!(cart.items().len(), 3);
        assert_eq!(cart.quantity_of(&ProductId::new("prod-widget")), 3);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut cart = Cart::new(UserId::new());
        assert_eq!(cart.add_item(widget(0, 1000)), Err(CartError::InvalidQuantity));

        let id = cart.add_item(widget(1, 1000)).unwrap();
        assert_eq!(cart.update_quantity(id, 0), Err(CartError::InvalidQuantity));
        assert_eq!(cart.items()[0].quantity, 1);
    }

    #[test]
    fn oversized_quantities_leave_cart_unchanged() {
        let pdf = Some(Variant::new("format", "pdf"));
        let epub = Some(Variant::new("format", "epub"));
        let mut cart = Cart::new(UserId::new());

        assert_eq!(
            cart.add_item(widget(u32::MAX, 100).with_variant(pdf.clone())),
            Err(CartError::InvalidQuantity)
        );
        assert!(cart.is_empty());

        let id = cart
            .add_item(widget(MAX_LINE_QUANTITY, 100).with_variant(pdf.clone()))
            .unwrap();
        cart.add_item(widget(2, 100).with_variant(epub)).unwrap();
        assert_eq!(
            cart.add_item(widget(1, 100).with_variant(pdf)),
            Err(CartError::InvalidQuantity)
        );
        assert_eq!(
            cart.update_quantity(id, MAX_LINE_QUANTITY + 1),
            Err(CartError::InvalidQuantity)
        );

        assert_eq!(cart.items()[0].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.totals().total_items, MAX_LINE_QUANTITY + 2);
        assert_eq!(
            cart.subtotal(),
            Money::from_cents(100 * i64::from(MAX_LINE_QUANTITY + 2))
        );
    }

    #[test]
    fn update_and_remove_recompute_totals() {
        let mut cart = Cart::new(UserId::new());
        let id = cart.add_item(widget(1, 2500)).unwrap();

        cart.update_quantity(id, 4).unwrap();
        assert_eq!(cart.subtotal(), Money::from_cents(10_000));

        cart.remove_item(id).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Money::zero());
    }

    #[test]
    fn unknown_item_is_reported() {
        let mut cart = Cart::new(UserId::new());
        let missing = CartItemId::new();
        assert_eq!(cart.remove_item(missing), Err(CartError::ItemNotFound(missing)));
        assert_eq!(
            cart.update_quantity(missing, 2),
            Err(CartError::ItemNotFound(missing))
        );
    }

    #[test]
    fn save10_on_200_leaves_180() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(2, 10_000)).unwrap();
        cart.apply_coupon("SAVE10", &CouponBook::default()).unwrap();

        let totals = cart.totals();
        assert_eq!(totals.discount, Money::from_major(20));
        assert_eq!(totals.final_amount, Money::from_major(180));
    }

    #[test]
    fn flat50_on_40_leaves_zero() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 4_000)).unwrap();
        cart.apply_coupon("FLAT50", &CouponBook::default()).unwrap();

        let totals = cart.totals();
        assert_eq!(totals.discount, Money::from_major(40));
        assert_eq!(totals.final_amount, Money::zero());
    }

    #[test]
    fn invalid_coupon_leaves_cart_unchanged() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 10_000)).unwrap();
        cart.apply_coupon("SAVE10", &CouponBook::default()).unwrap();
        let before = cart.clone();

        let err = cart.apply_coupon("NOPE", &CouponBook::default()).unwrap_err();
        assert_eq!(err, CartError::InvalidCoupon("NOPE".to_string()));
        assert_eq!(cart, before);
    }

    #[test]
    fn coupon_on_empty_cart_is_rejected() {
        let mut cart = Cart::new(UserId::new());
        assert_eq!(
            cart.apply_coupon("SAVE10", &CouponBook::default()).unwrap_err(),
            CartError::CartEmpty
        );
        assert!(cart.coupon().is_none());
    }

    #[test]
    fn applying_a_coupon_replaces_the_previous_one() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 20_000)).unwrap();
        let book = CouponBook::default();
        cart.apply_coupon("SAVE10", &book).unwrap();
        cart.apply_coupon("FLAT50", &book).unwrap();

        assert_eq!(cart.coupon().map(|c| c.code.as_str()), Some("FLAT50"));
        assert_eq!(cart.discount(), Money::from_major(50));

        cart.remove_coupon();
        assert_eq!(cart.discount(), Money::zero());
    }

    #[test]
    fn discount_follows_subtotal_after_mutation() {
        let mut cart = Cart::new(UserId::new());
        let id = cart.add_item(widget(1, 10_000)).unwrap();
        cart.apply_coupon("FLAT50", &CouponBook::default()).unwrap();

        cart.update_quantity(id, 1).unwrap();
        cart.remove_item(id).unwrap();
        assert_eq!(cart.discount(), Money::zero());
        assert_eq!(cart.totals().final_amount, Money::zero());
    }

    #[test]
    fn clear_drops_items_and_coupon() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 10_000)).unwrap();
        cart.apply_coupon("SAVE10", &CouponBook::default()).unwrap();

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.coupon().is_none());
        assert_eq!(cart.totals(), CartTotals::default());
    }
}
