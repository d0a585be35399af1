use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use marketplace_engine::{
    db_types::{Actor, OrderStatusType},
    events::{EventProducers, NotificationKind},
    traits::data_objects::ExpiryOutcome,
    CatalogManagement,
    CheckoutApi,
    MarketplaceConfig,
    MarketplaceError,
    OrderFlowApi,
    OrderManagement,
    OrderQueryApi,
};

mod support;
use support::*;

fn vendor() -> Actor {
    Actor::Vendor(VENDOR_OWNER.into())
}

#[tokio::test]
async fn vendor_moves_a_paid_order_to_delivered() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    pay_order(&db, &placed.order).await;
    let (producers, mut notifications) = notification_channel();
    let api = OrderFlowApi::new(db.clone(), producers);
    for status in [
        OrderStatusType::Processing,
        OrderStatusType::Packed,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
    ] {
        let outcome = api.update_status(placed.order.id, status, &vendor()).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.order.status, status);
    }
    // Only the customer hears about the vendor's own changes
    let sent = drain(&mut notifications);
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|n| n.user_id == "alice" && n.kind == NotificationKind::OrderStatusChanged));
    let log = db.fetch_order_status_log(placed.order.id).await.unwrap();
    let statuses = log.iter().map(|e| e.to_status).collect::<Vec<_>>();
    assert_eq!(statuses, vec![
        OrderStatusType::PendingPayment,
        OrderStatusType::Paid,
        OrderStatusType::Processing,
        OrderStatusType::Packed,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
    ]);
    assert_eq!(log[2].actor, format!("vendor:{VENDOR_OWNER}"));
    tear_down(db).await;
}

#[tokio::test]
async fn repeating_the_current_status_changes_nothing() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    pay_order(&db, &placed.order).await;
    let (producers, mut notifications) = notification_channel();
    let api = OrderFlowApi::new(db.clone(), producers);
    api.update_status(placed.order.id, OrderStatusType::Processing, &vendor()).await.unwrap();
    drain(&mut notifications);
    let outcome = api.update_status(placed.order.id, OrderStatusType::Processing, &vendor()).await.unwrap();
    assert!(!outcome.applied);
    assert!(drain(&mut notifications).is_empty());
    assert_eq!(db.fetch_order_status_log(placed.order.id).await.unwrap().len(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn role_and_table_rules_are_enforced() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    let order_id = placed.order.id;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    // Nobody but the payment flow marks an order as paid
    let err = api.update_status(order_id, OrderStatusType::Paid, &Actor::Operator("op".into())).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
    // Strangers have no access at all
    let err = api.update_status(order_id, OrderStatusType::Canceled, &Actor::Customer("mallory".into())).await;
    assert!(matches!(err, Err(MarketplaceError::Forbidden(_))));

    pay_order(&db, &placed.order).await;
    let err = api.update_status(order_id, OrderStatusType::Canceled, &vendor()).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
    let err = api.update_status(order_id, OrderStatusType::Processing, &Actor::Customer("alice".into())).await;
    assert!(matches!(err, Err(MarketplaceError::Forbidden(_))));
    // PAID cannot skip straight to SHIPPED
    let err = api.update_status(order_id, OrderStatusType::Shipped, &vendor()).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidTransition { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn pickup_orders_cannot_be_shipped() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_pickup_order(&db, &shop, "alice", 1).await;
    pay_order(&db, &placed.order).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    api.update_status(placed.order.id, OrderStatusType::Processing, &vendor()).await.unwrap();
    api.update_status(placed.order.id, OrderStatusType::Packed, &vendor()).await.unwrap();
    let err = api.update_status(placed.order.id, OrderStatusType::Shipped, &vendor()).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::FulfillmentMismatch { .. }));
    let outcome = api.update_status(placed.order.id, OrderStatusType::ReadyForPickup, &vendor()).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::ReadyForPickup);
    tear_down(db).await;
}

#[tokio::test]
async fn customer_cancellation_releases_the_reservation() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 2).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let outcome =
        api.update_status(placed.order.id, OrderStatusType::Canceled, &Actor::Customer("alice".into())).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::Canceled);
    assert_eq!(outcome.order.payment_expires_at, None);
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!((variant.stock_qty, variant.reserved_qty), (5, 0));
    // Terminal
    let err = api.update_status(placed.order.id, OrderStatusType::Paid, &Actor::System).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidTransition { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn operator_cancelling_a_paid_order_restocks_it() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 2).await;
    pay_order(&db, &placed.order).await;
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!((variant.stock_qty, variant.reserved_qty), (3, 0));
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    api.update_status(placed.order.id, OrderStatusType::Canceled, &Actor::Operator("op".into())).await.unwrap();
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!((variant.stock_qty, variant.reserved_qty), (5, 0));
    tear_down(db).await;
}

#[tokio::test]
async fn reservations_expire_once() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 3).await;
    let order_id = placed.order.id;
    let outcome = db.expire_reservation(order_id, Utc::now()).await.unwrap();
    assert!(matches!(outcome, ExpiryOutcome::NotDue(Some(_))));

    let later = Utc::now() + ChronoDuration::hours(1);
    let outcome = db.expire_reservation(order_id, later).await.unwrap();
    assert!(outcome.expired());
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!(variant.reserved_qty, 0);
    let outcome = db.expire_reservation(order_id, later).await.unwrap();
    assert_eq!(outcome, ExpiryOutcome::NotPending(OrderStatusType::Canceled));
    assert_eq!(db.expire_reservation(9999, later).await.unwrap(), ExpiryOutcome::OrderMissing);
    tear_down(db).await;
}

#[tokio::test]
async fn the_sweep_cancels_overdue_orders() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let config = MarketplaceConfig { reservation_window: Duration::from_millis(1), ..Default::default() };
    let checkout = CheckoutApi::new(db.clone(), EventProducers::default(), config);
    let address_id = add_address(&db, "alice").await;
    checkout.add_to_cart("alice", shop.variant_id, 1).await.unwrap();
    let placed = checkout
        .checkout(&marketplace_engine::checkout::CheckoutRequest::shipping("alice", address_id))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let expired = api.sweep_expired_reservations(10).await.unwrap();
    assert_eq!(expired, vec![placed.order.id]);
    assert!(api.sweep_expired_reservations(10).await.unwrap().is_empty());
    let order = db.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Canceled);
    tear_down(db).await;
}

#[tokio::test]
async fn customers_page_through_their_orders() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 10, 300).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(place_pickup_order(&db, &shop, "alice", 1).await.order.id);
    }
    place_pickup_order(&db, &shop, "bob", 1).await;
    let api = OrderQueryApi::new(db.clone());
    let first = api.orders_for_customer("alice", None, Some(2)).await.unwrap();
    assert_eq!(first.orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
    let token = first.next_page.expect("a second page");
    let second = api.orders_for_customer("alice", Some(&token), Some(2)).await.unwrap();
    assert_eq!(second.orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[0]]);
    assert!(second.next_page.is_none());
    let err = api.orders_for_customer("alice", Some("not-a-token"), None).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidPageToken(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn order_details_are_for_participants_only() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 10, 300).await;
    let placed = place_pickup_order(&db, &shop, "alice", 2).await;
    pay_order(&db, &placed.order).await;
    let api = OrderQueryApi::new(db.clone());
    let details = api.order_details(placed.order.id, &vendor()).await.unwrap();
    assert_eq!(details.order.status, OrderStatusType::Paid);
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.status_log.len(), 2);
    assert!(api.order_details(placed.order.id, &Actor::Customer("alice".into())).await.is_ok());
    let err = api.order_details(placed.order.id, &Actor::Customer("bob".into())).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
    let err = api.order_details(4242, &Actor::System).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::OrderNotFound(4242)));
    tear_down(db).await;
}
