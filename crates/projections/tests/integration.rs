//! Order commands → journal → processor → list views.

use common::{AggregateId, UserId};
use domain::{
    Address, CancelOrder, Money, OrderLine, OrderService, OrderStatus, PaymentEvent,
    PaymentMethod, PaymentSource, PaymentStatus, PlaceOrder, PricingSnapshot, ProductId,
    ShippingOption, UpdateStatus,
};
use event_store::InMemoryEventStore;
use projections::{CustomerOrdersView, OrderListView, OrderQuery, ProjectionProcessor};

struct Harness {
    orders: OrderService<InMemoryEventStore>,
    processor: ProjectionProcessor<InMemoryEventStore>,
    customers: CustomerOrdersView,
    list: OrderListView,
}

fn harness() -> Harness {
    let store = InMemoryEventStore::new();
    let customers = CustomerOrdersView::new();
    let list = OrderListView::new();
    let mut processor = ProjectionProcessor::new(store.clone());
    processor.register(Box::new(customers.clone()));
    processor.register(Box::new(list.clone()));
    Harness {
        orders: OrderService::new(store),
        processor,
        customers,
        list,
    }
}

async fn place(h: &Harness, user_id: UserId, number: &str, total_major: i64) -> AggregateId {
    let order_id = AggregateId::new();
    h.orders
        .place_order(PlaceOrder {
            order_id,
            order_number: number.into(),
            user_id,
            items: vec![OrderLine {
                product_id: ProductId::new("kettle"),
                name: "Kettle".into(),
                sku: "KTL-1".into(),
                quantity: 3,
                unit_price: Money::from_major(10),
                variant: None,
            }],
            shipping_address: Address {
                first_name: "Ravi".into(),
                last_name: "Iyer".into(),
                street: "12 MG Rd".into(),
                city: "Chennai".into(),
                state: "TN".into(),
                zip_code: "600001".into(),
                country: "IN".into(),
                phone: None,
            },
            billing_address: None,
            payment_method: PaymentMethod::Upi,
            shipping_method: ShippingOption::Standard,
            pricing: PricingSnapshot {
                total_amount: Money::from_major(total_major),
                ..PricingSnapshot::default()
            },
            coupon: None,
        })
        .await
        .unwrap();
    order_id
}

#[tokio::test]
async fn views_follow_the_order_lifecycle() {
    let h = harness();
    let user = UserId::new();
    let admin = UserId::new();

    let paid = place(&h, user, "ORD-20260101-000001", 40).await;
    let cancelled = place(&h, user, "ORD-20260101-000002", 25).await;
    place(&h, UserId::new(), "ORD-20260101-000003", 99).await;

    h.orders
        .apply_payment(
            paid,
            PaymentEvent::Captured {
                transaction_id: "pay_1".into(),
                external_order_id: None,
                source: PaymentSource::Webhook,
            },
        )
        .await
        .unwrap();
    h.orders
        .update_status(
            UpdateStatus::new(paid, OrderStatus::Processing, admin).with_note("packing"),
        )
        .await
        .unwrap();
    h.orders
        .cancel_order(CancelOrder::new(cancelled, user, "duplicate"))
        .await
        .unwrap();

    h.processor.run_catch_up().await.unwrap();

    let mine = h.customers.orders_for(user).await;
    assert_eq!(mine.len(), 2);
    let paid_summary = mine.iter().find(|o| o.order_id == paid).unwrap();
    assert_eq!(paid_summary.status, OrderStatus::Processing);
    assert_eq!(paid_summary.payment_status, PaymentStatus::Completed);
    assert_eq!(paid_summary.total_items, 3);
    let cancelled_summary = mine.iter().find(|o| o.order_id == cancelled).unwrap();
    assert_eq!(cancelled_summary.status, OrderStatus::Cancelled);

    let page = h.list.page(OrderQuery::default()).await;
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 1);
    assert_eq!(h.list.captured_revenue().await, Money::from_major(40));
}

#[tokio::test]
async fn catch_up_is_incremental() {
    let h = harness();
    let user = UserId::new();

    place(&h, user, "ORD-20260101-000001", 10).await;
    h.processor.run_catch_up().await.unwrap();
    assert_eq!(h.customers.order_count(user).await, 1);

    place(&h, user, "ORD-20260101-000002", 10).await;
    h.processor.run_catch_up().await.unwrap();
    h.processor.run_catch_up().await.unwrap();

    assert_eq!(h.customers.order_count(user).await, 2);
    assert_eq!(h.list.len().await, 2);
}

#[tokio::test]
async fn rebuild_reproduces_the_same_views() {
    let h = harness();
    let user = UserId::new();
    let order_id = place(&h, user, "ORD-20260101-000001", 10).await;
    h.orders
        .apply_payment(
            order_id,
            PaymentEvent::Failed {
                transaction_id: None,
                source: PaymentSource::Webhook,
            },
        )
        .await
        .unwrap();

    h.processor.run_catch_up().await.unwrap();
    let before = h.customers.orders_for(user).await;

    h.processor.rebuild_all().await.unwrap();

    assert_eq!(h.customers.orders_for(user).await, before);
    assert_eq!(before[0].payment_status, PaymentStatus::Failed);
}
