use chrono::Utc;
use futures_util::future::join_all;
use marketplace_engine::{
    checkout::CheckoutRequest,
    db_types::{FulfillmentKind, MinorUnits, OrderStatusType, VendorStatus},
    CatalogManagement,
    MarketplaceError,
    OrderManagement,
};

mod support;
use support::*;

#[tokio::test]
async fn checkout_snapshots_prices_and_reserves_stock() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 2).await;
    let order = &placed.order;
    assert_eq!(order.status, OrderStatusType::PendingPayment);
    assert_eq!(order.fulfillment, FulfillmentKind::Shipping);
    assert_eq!(order.subtotal, MinorUnits::from(2000));
    assert_eq!(order.shipping_fee, MinorUnits::from(300));
    assert_eq!(order.total, MinorUnits::from(2300));
    assert!(order.payment_expires_at.unwrap() > Utc::now());
    assert_eq!(placed.vendor_owner, VENDOR_OWNER);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].unit_price, MinorUnits::from(1000));
    assert_eq!(placed.items[0].line_total, MinorUnits::from(2000));

    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!(variant.stock_qty, 5);
    assert_eq!(variant.reserved_qty, 2);
    // The cart is gone
    assert!(db.fetch_cart_items("alice").await.unwrap().is_empty());
    // and the order was logged
    let log = db.fetch_order_status_log(order.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].to_status, OrderStatusType::PendingPayment);
    tear_down(db).await;
}

#[tokio::test]
async fn pickup_orders_have_no_shipping_fee() {
    let db = setup().await;
    let shop = seed_shop(&db, 1500, 5, 300).await;
    let placed = place_pickup_order(&db, &shop, "bob", 1).await;
    assert_eq!(placed.order.fulfillment, FulfillmentKind::Pickup);
    assert_eq!(placed.order.shipping_fee, MinorUnits::zero());
    assert_eq!(placed.order.total, MinorUnits::from(1500));
    assert_eq!(placed.order.pickup_location_id, Some(shop.pickup_location_id));
    tear_down(db).await;
}

#[tokio::test]
async fn last_units_go_to_the_first_checkout() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 3, 300).await;
    let api = checkout_api(&db);
    let alice_address = add_address(&db, "alice").await;
    let bob_address = add_address(&db, "bob").await;
    api.add_to_cart("alice", shop.variant_id, 3).await.unwrap();
    api.add_to_cart("bob", shop.variant_id, 1).await.unwrap();

    api.checkout(&CheckoutRequest::shipping("alice", alice_address)).await.unwrap();
    let err = api.checkout(&CheckoutRequest::shipping("bob", bob_address)).await.unwrap_err();
    match err {
        MarketplaceError::InsufficientStock { variant_id, requested, available } => {
            assert_eq!(variant_id, shop.variant_id);
            assert_eq!(requested, 1);
            assert_eq!(available, 0);
        },
        other => panic!("Unexpected error {other}"),
    }
    // Bob's cart survives the failed checkout
    assert_eq!(db.fetch_cart_items("bob").await.unwrap().len(), 1);
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!(variant.reserved_qty, 3);
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let db = setup().await;
    let shop = seed_shop(&db, 500, 5, 0).await;
    let api = checkout_api(&db);
    let mut requests = Vec::new();
    for i in 0..10 {
        let customer = format!("customer-{i}");
        let address_id = add_address(&db, &customer).await;
        api.add_to_cart(&customer, shop.variant_id, 1).await.unwrap();
        requests.push(CheckoutRequest::shipping(customer, address_id));
    }
    let results = join_all(requests.iter().map(|r| api.checkout(r))).await;
    let placed = results.iter().filter(|r| r.is_ok()).count();
    let sold_out =
        results.iter().filter(|r| matches!(r, Err(MarketplaceError::InsufficientStock { .. }))).count();
    assert_eq!(placed, 5);
    assert_eq!(sold_out, 5);
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!(variant.reserved_qty, 5);
    assert!(variant.reserved_qty <= variant.stock_qty);
    tear_down(db).await;
}

#[tokio::test]
async fn empty_carts_and_unapproved_vendors_are_rejected() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let api = checkout_api(&db);
    let address_id = add_address(&db, "carol").await;
    let err = api.checkout(&CheckoutRequest::shipping("carol", address_id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::CartEmpty));

    api.add_to_cart("carol", shop.variant_id, 1).await.unwrap();
    db.set_vendor_status(shop.vendor_id, VendorStatus::Suspended, Utc::now()).await.unwrap();
    let err = api.checkout(&CheckoutRequest::shipping("carol", address_id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::VendorNotApproved(id) if id == shop.vendor_id));
    let variant = db.fetch_variant(shop.variant_id).await.unwrap().unwrap();
    assert_eq!(variant.reserved_qty, 0);
    tear_down(db).await;
}

#[tokio::test]
async fn shipping_needs_an_address_of_the_customer() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let api = checkout_api(&db);
    let someone_elses = add_address(&db, "dave").await;
    api.add_to_cart("erin", shop.variant_id, 1).await.unwrap();
    let err = api.checkout(&CheckoutRequest::shipping("erin", someone_elses)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::ShippingAddressNotFound(_)));
    tear_down(db).await;
}
