use std::sync::Arc;

use chrono::Duration;
use marketplace_engine::{
    db_types::{Actor, LedgerEntryType, OrderStatusType, PaymentStatus, ReturnStatus},
    events::{EventProducers, NotificationKind},
    traits::CardNetworkClient,
    MarketplaceConfig,
    MarketplaceError,
    OrderManagement,
    PaymentApi,
    PaymentGateways,
    PaymentManagement,
    ReturnManagement,
    ReturnsApi,
    SqliteDatabase,
};

mod support;
use support::*;

/// Mobile money only. The card network is never touched by these tests.
struct NoCardNetwork;

impl CardNetworkClient for NoCardNetwork {
    async fn create_checkout_session(
        &self,
        _session: &card_network_tools::NewCheckoutSession,
    ) -> Result<card_network_tools::CheckoutSession, card_network_tools::CardNetworkError> {
        Err(card_network_tools::CardNetworkError::NotConfigured("test".into()))
    }

    async fn retrieve_checkout_session(
        &self,
        _session_id: &str,
    ) -> Result<card_network_tools::CheckoutSession, card_network_tools::CardNetworkError> {
        Err(card_network_tools::CardNetworkError::NotConfigured("test".into()))
    }

    async fn create_refund(
        &self,
        _refund: &card_network_tools::NewRefund,
    ) -> Result<card_network_tools::Refund, card_network_tools::CardNetworkError> {
        Err(card_network_tools::CardNetworkError::NotConfigured("test".into()))
    }
}

fn returns_api(db: &SqliteDatabase, producers: EventProducers) -> ReturnsApi<SqliteDatabase, NoCardNetwork> {
    let gateways = PaymentGateways::<NoCardNetwork>::default().with_all_mobile_money().unwrap();
    let payments = PaymentApi::new(db.clone(), Arc::new(gateways), producers.clone());
    ReturnsApi::new(db.clone(), payments, MarketplaceConfig::default(), producers)
}

fn vendor() -> Actor {
    Actor::Vendor(VENDOR_OWNER.into())
}

#[tokio::test]
async fn full_return_ends_in_a_refund() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    let payment = deliver_order(&db, &placed.order).await;
    let (producers, mut notifications) = notification_channel();
    let api = returns_api(&db, producers);

    let opened = api.request_return(placed.order.id, "alice", "Wrong colour").await.unwrap();
    assert_eq!(opened.request.status, ReturnStatus::Requested);
    assert_eq!(opened.order.status, OrderStatusType::ReturnRequested);
    let sent = drain(&mut notifications);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, VENDOR_OWNER);
    assert_eq!(sent[0].kind, NotificationKind::ReturnUpdated);

    let return_id = opened.request.id;
    // Refunds wait for the goods
    let err = api.issue_refund(return_id, &Actor::Operator("op".into())).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidReturnTransition { .. }));

    let approved = api.approve_return(return_id, &vendor()).await.unwrap();
    assert_eq!(approved.order.status, OrderStatusType::ReturnApproved);
    let received = api.receive_return(return_id, &vendor()).await.unwrap();
    assert_eq!(received.request.status, ReturnStatus::Received);
    assert_eq!(received.order.status, OrderStatusType::Returned);

    let refunded = api.issue_refund(return_id, &Actor::Operator("op".into())).await.unwrap();
    assert_eq!(refunded.outcome.request.status, ReturnStatus::Refunded);
    assert_eq!(refunded.outcome.request.refund_amount, Some(placed.order.total));
    assert_eq!(refunded.outcome.request.refund_reference.as_deref(), Some(refunded.refund.reference.as_str()));
    assert_eq!(refunded.outcome.order.status, OrderStatusType::Refunded);
    assert_eq!(refunded.refund.payment.id, payment.id);
    assert_eq!(refunded.refund.payment.status, PaymentStatus::Refunded);

    let entries = db.fetch_ledger_entries_for_order(placed.order.id).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.entry_type == LedgerEntryType::Debit).count(), 1);
    // A closed return cannot be refunded again
    let err = api.issue_refund(return_id, &Actor::Operator("op".into())).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidReturnTransition { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn rejected_returns_restore_the_completed_status() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    deliver_order(&db, &placed.order).await;
    let api = returns_api(&db, EventProducers::default());
    let opened = api.request_return(placed.order.id, "alice", "Changed my mind").await.unwrap();
    let err = api.request_return(placed.order.id, "alice", "Again").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::ReturnNotAllowed(OrderStatusType::ReturnRequested)));
    // Customers cannot review their own return
    let err = api.reject_return(opened.request.id, &Actor::Customer("alice".into())).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let rejected = api.reject_return(opened.request.id, &vendor()).await.unwrap();
    assert_eq!(rejected.request.status, ReturnStatus::Rejected);
    assert_eq!(rejected.order.status, OrderStatusType::Delivered);
    let err = api.receive_return(opened.request.id, &vendor()).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidReturnTransition { .. }));
    assert!(db.fetch_open_return_for_order(placed.order.id).await.unwrap().is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn returns_close_after_the_window() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    deliver_order(&db, &placed.order).await;
    let delivered = db.fetch_order(placed.order.id).await.unwrap().unwrap();

    let too_late = delivered.updated_at + Duration::days(31);
    let err = db.open_return(delivered.id, "alice", "Late", 30, too_late).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::ReturnWindowExpired(30)));

    let just_in_time = delivered.updated_at + Duration::days(30);
    let outcome = db.open_return(delivered.id, "alice", "Just made it", 30, just_in_time).await.unwrap();
    assert_eq!(outcome.request.status, ReturnStatus::Requested);
    tear_down(db).await;
}

#[tokio::test]
async fn only_delivered_orders_of_the_customer_can_be_returned() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    let api = returns_api(&db, EventProducers::default());
    pay_order(&db, &placed.order).await;
    let err = api.request_return(placed.order.id, "alice", "Not yet shipped").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::ReturnNotAllowed(OrderStatusType::Paid)));
    let err = api.request_return(placed.order.id, "bob", "Not mine").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
    let err = api.request_return(9999, "alice", "Missing").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::OrderNotFound(9999)));
    tear_down(db).await;
}
