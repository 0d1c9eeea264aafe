//! Customer order endpoints: checkout, listing, detail and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::CheckoutRequest;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{
    Address, Aggregate, Coupon, Money, Order, OrderLine, OrderStatus, PaymentMethod,
    PaymentStatus, ProductId, ShippingOption, Variant,
};
use event_store::EventStore;
use projections::OrderSummary;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, Identity};

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Full view of an order. Amounts are in minor units.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Option<AggregateId>,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub items: Vec<OrderLineResponse>,
    pub total_items: u32,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub coupon: Option<Coupon>,
    pub payment: Option<PaymentResponse>,
    pub shipping: Option<ShippingResponse>,
    pub status_history: Vec<StatusEntryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub external_order_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingResponse {
    pub method: ShippingOption,
    pub tracking_number: Option<String>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntryResponse {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    pub actor_id: Option<UserId>,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            sku: line.sku.clone(),
            quantity: line.quantity,
            variant: line.variant.clone(),
            unit_price: line.unit_price,
            line_total: line.line_total(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let pricing = order.pricing();
        Self {
            id: order.id(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            status: order.status(),
            items: order.items().iter().map(OrderLineResponse::from).collect(),
            total_items: order.total_items(),
            shipping_address: order.shipping_address().cloned(),
            billing_address: order.billing_address().cloned(),
            subtotal: pricing.subtotal,
            tax_amount: pricing.tax_amount,
            shipping_cost: pricing.shipping_cost,
            discount_amount: pricing.discount_amount,
            total_amount: pricing.total_amount,
            coupon: order.coupon().cloned(),
            payment: order.payment().map(|p| PaymentResponse {
                method: p.method,
                status: p.status,
                transaction_id: p.transaction_id.clone(),
                external_order_id: p.external_order_id.clone(),
                paid_at: p.paid_at,
            }),
            shipping: order.shipping().map(|s| ShippingResponse {
                method: s.method,
                tracking_number: s.tracking_number.clone(),
                actual_delivery: s.actual_delivery,
            }),
            status_history: order
                .status_history()
                .iter()
                .map(|entry| StatusEntryResponse {
                    status: entry.status,
                    timestamp: entry.timestamp,
                    note: entry.note.clone(),
                    actor_id: entry.actor_id,
                })
                .collect(),
            cancel_reason: order.cancel_reason().map(str::to_string),
            placed_at: order.placed_at(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderSummary>,
    pub total: usize,
}

/// POST /orders: checks out the caller's cart.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn place<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.checkout.place_order(actor.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: the caller's orders, newest first.
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Result<Json<OrderListResponse>, ApiError> {
    state.processor.run_catch_up().await?;
    let orders = state.customer_orders.orders_for(actor.user_id).await;
    Ok(Json(OrderListResponse {
        total: orders.len(),
        orders,
    }))
}

/// GET /orders/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiPath(order_id): ApiPath<AggregateId>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.fulfillment.get_order(&actor, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiPath(order_id): ApiPath<AggregateId>,
    ApiJson(req): ApiJson<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .fulfillment
        .cancel_order(&actor, order_id, req.reason)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}
