//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{Cart, CartItem, CartItemId, Coupon, Money, ProductId, Variant};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, Identity};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub variant: Option<Variant>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CouponRequest {
    pub code: String,
}

/// Amounts are in minor units.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub user_id: UserId,
    pub items: Vec<CartItemResponse>,
    pub coupon: Option<Coupon>,
    pub total_items: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub final_amount: Money,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            item_id: item.item_id,
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity,
            variant: item.variant.clone(),
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let totals = cart.totals();
        Self {
            user_id: cart.user_id(),
            items: cart.items().iter().map(CartItemResponse::from).collect(),
            coupon: cart.coupon().cloned(),
            total_items: totals.total_items,
            subtotal: totals.subtotal,
            discount: totals.discount,
            final_amount: totals.final_amount,
            updated_at: cart.updated_at(),
        }
    }
}

/// GET /cart
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Json<CartResponse> {
    Json(state.carts.get_cart(actor.user_id).await.into())
}

/// DELETE /cart
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Json<CartResponse> {
    Json(state.carts.clear_cart(actor.user_id).await.into())
}

/// POST /cart/items
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .add_to_cart(actor.user_id, req.product_id, req.quantity, req.variant)
        .await?;
    Ok(Json(cart.into()))
}

/// PUT /cart/items/{item_id}
pub async fn update_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiPath(item_id): ApiPath<CartItemId>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .update_cart_item(actor.user_id, item_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/{item_id}
pub async fn remove_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiPath(item_id): ApiPath<CartItemId>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.remove_cart_item(actor.user_id, item_id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/coupon
pub async fn apply_coupon<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiJson(req): ApiJson<CouponRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.apply_coupon(actor.user_id, &req.code).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/coupon
pub async fn remove_coupon<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Json<CartResponse> {
    Json(state.carts.remove_coupon(actor.user_id).await.into())
}
