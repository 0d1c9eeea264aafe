//! Administrative endpoints: order listing and status changes, stock
//! settings and the product catalog.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::{CheckoutError, InventoryRecord, ProductSnapshot, StockStatus};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Money, OrderStatus, ProductId};
use event_store::EventStore;
use projections::{OrderPage, OrderQuery, StatusCount};
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{AdminIdentity, ApiJson, ApiPath, ApiQuery};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatsResponse {
    pub total_orders: usize,
    pub counts: Vec<StatusCount>,
    /// Sum of completed payments, minor units.
    pub captured_revenue: Money,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    pub quantity: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
    #[serde(default = "default_true")]
    pub track_quantity: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub product_id: ProductId,
    pub quantity: u32,
    pub low_stock_threshold: u32,
    pub track_quantity: bool,
    pub stock_status: StockStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<InventoryRecord> for InventoryResponse {
    fn from(record: InventoryRecord) -> Self {
        Self {
            stock_status: record.stock_status(),
            product_id: record.product_id,
            quantity: record.quantity,
            low_stock_threshold: record.low_stock_threshold,
            track_quantity: record.track_quantity,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub sku: String,
    /// Minor units.
    pub price: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub active: bool,
}

/// GET /admin/orders?page=&limit=&status=
pub async fn list_orders<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(_): AdminIdentity,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    state.processor.run_catch_up().await?;
    Ok(Json(state.order_list.page(query).await))
}

/// GET /admin/orders/stats
pub async fn order_stats<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(_): AdminIdentity,
) -> Result<Json<OrderStatsResponse>, ApiError> {
    state.processor.run_catch_up().await?;
    Ok(Json(OrderStatsResponse {
        total_orders: state.order_list.len().await,
        counts: state.order_list.status_counts().await,
        captured_revenue: state.order_list.captured_revenue().await,
    }))
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip_all, fields(order_id = %order_id, status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(actor): AdminIdentity,
    ApiPath(order_id): ApiPath<AggregateId>,
    ApiJson(req): ApiJson<StatusUpdateRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .fulfillment
        .update_status(&actor, order_id, req.status, req.note, req.tracking_number)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /admin/inventory/{product_id}
pub async fn get_inventory<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(_): AdminIdentity,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .ledger
        .record(&product_id)
        .await?
        .ok_or(CheckoutError::NotFound {
            what: "inventory record",
        })?;
    Ok(Json(record.into()))
}

/// PUT /admin/inventory/{product_id}
#[tracing::instrument(skip_all, fields(product_id = %product_id))]
pub async fn set_inventory<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(_): AdminIdentity,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<InventoryRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let mut record = if req.track_quantity {
        InventoryRecord::tracked(product_id, req.quantity)
    } else {
        InventoryRecord::untracked(product_id)
    };
    if let Some(threshold) = req.low_stock_threshold {
        record = record.with_threshold(threshold);
    }
    let saved = state.ledger.set_record(record).await?;
    tracing::info!(quantity = saved.quantity, "inventory updated");
    Ok(Json(saved.into()))
}

/// PUT /admin/products/{product_id}
pub async fn upsert_product<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminIdentity(_): AdminIdentity,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(CheckoutError::field("name", "is required").into());
    }
    if req.price < 0 {
        return Err(CheckoutError::field("price", "must not be negative").into());
    }

    let mut product = ProductSnapshot::new(product_id, req.name, req.sku, Money::from_cents(req.price));
    product.active = req.active;
    state.catalog.upsert(product.clone()).await;

    Ok(Json(ProductResponse {
        product_id: product.product_id,
        name: product.name,
        sku: product.sku,
        price: product.price,
        active: product.active,
    }))
}
