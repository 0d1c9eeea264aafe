//! HTTP API for the order-fulfillment pipeline.
//!
//! Callers are identified by the `X-User-Id` / `X-User-Role` headers set by
//! the authenticating proxy in front of this service. Errors are JSON with a
//! stable `kind` code; see [`error`].

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CartService, CheckoutError, CheckoutService, FulfillmentService, HttpGateway, InMemoryCatalog,
    InMemoryGateway,
    InMemoryInventoryLedger, InventoryLedger, OrderNumberGenerator, PaymentGateway,
    PaymentReconciler, PostgresInventoryLedger, PostgresOrderNumbers, ProductCatalog,
    SequenceOrderNumbers,
};
use domain::{CouponBook, OrderService};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{CustomerOrdersView, OrderListView, ProjectionProcessor};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Services shared by every handler.
pub struct AppState<S: EventStore> {
    pub catalog: InMemoryCatalog,
    pub carts: CartService,
    pub ledger: Arc<dyn InventoryLedger>,
    pub checkout: CheckoutService<S>,
    pub fulfillment: FulfillmentService<S>,
    pub payments: PaymentReconciler<S>,
    pub customer_orders: CustomerOrdersView,
    pub order_list: OrderListView,
    pub processor: ProjectionProcessor<S>,
}

/// Storage and integrations the services are built on.
pub struct Backends<S> {
    pub store: S,
    pub ledger: Arc<dyn InventoryLedger>,
    pub numbers: Arc<dyn OrderNumberGenerator>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub catalog: InMemoryCatalog,
}

impl<S> Backends<S> {
    /// Replaces the in-process payment gateway.
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }
}

/// The REST gateway when `PAYMENT_GATEWAY_URL` is set, otherwise the
/// in-process one.
pub fn payment_gateway(config: &Config) -> Result<Arc<dyn PaymentGateway>, CheckoutError> {
    match &config.payment_gateway_url {
        Some(url) => {
            let gateway = HttpGateway::new(
                url.as_str(),
                config.payments.key_id.as_str(),
                config.payments.key_secret.as_str(),
                config.gateway_timeout,
            )?;
            tracing::info!(%url, "using payment gateway");
            Ok(Arc::new(gateway))
        }
        None => Ok(Arc::new(InMemoryGateway::new())),
    }
}

impl Backends<InMemoryEventStore> {
    /// Everything in process memory.
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryEventStore::new(),
            ledger: Arc::new(InMemoryInventoryLedger::new()),
            numbers: Arc::new(SequenceOrderNumbers::new()),
            gateway: Arc::new(InMemoryGateway::new()),
            catalog: InMemoryCatalog::new(),
        }
    }
}

impl Backends<PostgresEventStore> {
    /// Journal, stock and order numbers in Postgres. The catalog stays in
    /// memory; see [`Backends::with_gateway`] for the payment gateway.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            store: PostgresEventStore::new(pool.clone()),
            ledger: Arc::new(PostgresInventoryLedger::new(pool.clone())),
            numbers: Arc::new(PostgresOrderNumbers::new(pool)),
            gateway: Arc::new(InMemoryGateway::new()),
            catalog: InMemoryCatalog::new(),
        }
    }
}

/// Wires the services and read models over `backends`.
pub fn create_state<S: EventStore + Clone + 'static>(
    backends: Backends<S>,
    config: &Config,
) -> Arc<AppState<S>> {
    let Backends {
        store,
        ledger,
        numbers,
        gateway,
        catalog,
    } = backends;

    let orders = Arc::new(OrderService::new(store.clone()));
    let products: Arc<dyn ProductCatalog> = Arc::new(catalog.clone());
    let carts = CartService::new(products, ledger.clone(), CouponBook::default());

    let checkout = CheckoutService::new(
        carts.clone(),
        ledger.clone(),
        numbers,
        orders.clone(),
        config.pricing,
    );
    let fulfillment = FulfillmentService::new(orders.clone(), ledger.clone());
    let payments = PaymentReconciler::new(orders, gateway, config.payments.clone())
        .with_timeout(config.gateway_timeout);

    let customer_orders = CustomerOrdersView::new();
    let order_list = OrderListView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(customer_orders.clone()));
    processor.register(Box::new(order_list.clone()));

    Arc::new(AppState {
        catalog,
        carts,
        ledger,
        checkout,
        fulfillment,
        payments,
        customer_orders,
        order_list,
        processor,
    })
}

/// Builds the router over shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{admin, cart, orders, payments};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            put(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route(
            "/cart/coupon",
            post(cart::apply_coupon::<S>).delete(cart::remove_coupon::<S>),
        )
        .route("/orders", post(orders::place::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/admin/orders", get(admin::list_orders::<S>))
        .route("/admin/orders/stats", get(admin::order_stats::<S>))
        .route("/admin/orders/{id}/status", put(admin::update_status::<S>))
        .route(
            "/admin/inventory/{product_id}",
            get(admin::get_inventory::<S>).put(admin::set_inventory::<S>),
        )
        .route("/admin/products/{product_id}", put(admin::upsert_product::<S>))
        .route("/payments/orders", post(payments::create_order::<S>))
        .route("/payments/verify", post(payments::verify::<S>))
        .route("/payments/webhook", post(payments::webhook::<S>))
        .route("/payments/{payment_id}", get(payments::get_payment::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(axum::middleware::from_fn(routes::metrics::track_requests))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
