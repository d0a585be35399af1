#![allow(dead_code)]

use chrono::Utc;
use log::*;
use marketplace_engine::{
    checkout::CheckoutRequest,
    db_types::{
        Actor,
        MinorUnits,
        NewPayment,
        Order,
        OrderStatusType,
        Payment,
        PaymentProvider,
        NewAddress,
        NewProduct,
        NewShippingRate,
        NewVariant,
        NewVendor,
        ProductStatus,
        VendorStatus,
    },
    events::{EventProducer, EventProducers, Notification},
    traits::data_objects::{PlacedOrder, SettlementOutcome},
    CatalogManagement,
    CheckoutApi,
    MarketplaceConfig,
    MarketplaceDatabase,
    OrderManagement,
    PaymentManagement,
    ReturnManagement,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::mpsc;

pub const VENDOR_OWNER: &str = "vendor-owner";
pub const CURRENCY: &str = "KES";

pub fn random_db_url() -> String {
    let path = std::env::temp_dir().join(format!("mkt_engine_test_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

pub async fn setup() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_url();
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    db.migrate().await.expect("Error running migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not drop {url}: {e}");
    }
}

/// An approved vendor with one active product, one variant and a shipping rate for KE.
#[derive(Debug, Clone)]
pub struct Shop {
    pub vendor_id: i64,
    pub variant_id: i64,
    pub pickup_location_id: i64,
}

pub async fn seed_shop(db: &SqliteDatabase, price: i64, stock: i64, shipping_fee: i64) -> Shop {
    seed_shop_for(db, VENDOR_OWNER, price, stock, shipping_fee).await
}

pub async fn seed_shop_for(db: &SqliteDatabase, owner: &str, price: i64, stock: i64, shipping_fee: i64) -> Shop {
    let now = Utc::now();
    let vendor = db.create_vendor_application(NewVendor::new(owner, format!("{owner}'s shop")), now).await.unwrap();
    db.set_vendor_status(vendor.id, VendorStatus::Approved, now).await.unwrap();
    let product = db
        .create_product(
            NewProduct { vendor_id: vendor.id, title: "Kikoi".into(), status: ProductStatus::Active },
            now,
        )
        .await
        .unwrap();
    let variant = db
        .create_variant(
            NewVariant {
                product_id: product.id,
                sku: "KIK-BLUE".into(),
                price: MinorUnits::from(price),
                currency: CURRENCY.into(),
                stock_qty: stock,
            },
            now,
        )
        .await
        .unwrap();
    let rate = NewShippingRate {
        vendor_id: vendor.id,
        country: "KE".into(),
        fee: MinorUnits::from(shipping_fee),
        currency: CURRENCY.into(),
        active: true,
    };
    db.add_shipping_rate(rate, now).await.unwrap();
    let pickup = db.add_pickup_location(vendor.id, "Westlands stall", now).await.unwrap();
    Shop { vendor_id: vendor.id, variant_id: variant.id, pickup_location_id: pickup.id }
}

pub async fn add_address(db: &SqliteDatabase, customer_id: &str) -> i64 {
    let address = NewAddress {
        owner_user_id: customer_id.into(),
        line1: "12 Moi Avenue".into(),
        city: "Nairobi".into(),
        country: "KE".into(),
    };
    db.add_address(address, Utc::now()).await.unwrap().id
}

pub fn checkout_api(db: &SqliteDatabase) -> CheckoutApi<SqliteDatabase> {
    CheckoutApi::new(db.clone(), EventProducers::default(), MarketplaceConfig::default())
}

/// Puts `qty` units in the customer's cart and checks out with shipping.
pub async fn place_shipping_order(db: &SqliteDatabase, shop: &Shop, customer_id: &str, qty: i64) -> PlacedOrder {
    let api = checkout_api(db);
    let address_id = add_address(db, customer_id).await;
    api.add_to_cart(customer_id, shop.variant_id, qty).await.unwrap();
    api.checkout(&CheckoutRequest::shipping(customer_id, address_id)).await.unwrap()
}

pub async fn place_pickup_order(db: &SqliteDatabase, shop: &Shop, customer_id: &str, qty: i64) -> PlacedOrder {
    let api = checkout_api(db);
    api.add_to_cart(customer_id, shop.variant_id, qty).await.unwrap();
    api.checkout(&CheckoutRequest::pickup(customer_id, shop.pickup_location_id)).await.unwrap()
}

/// Producers whose notifications land in the returned receiver.
pub fn notification_channel() -> (EventProducers, mpsc::Receiver<Notification>) {
    let (sender, receiver) = mpsc::channel(64);
    let mut producers = EventProducers::default();
    producers.notification_producer.push(EventProducer::new(sender));
    (producers, receiver)
}

pub fn drain<E>(receiver: &mut mpsc::Receiver<E>) -> Vec<E> {
    let mut result = Vec::new();
    while let Ok(e) = receiver.try_recv() {
        result.push(e);
    }
    result
}

/// Settles the order with a mobile money payment, straight through the backend.
pub async fn pay_order(db: &SqliteDatabase, order: &Order) -> Payment {
    let reference = format!("mma_test{}", order.id);
    let payment = NewPayment {
        order_id: order.id,
        provider: PaymentProvider::MobileMoneyA,
        provider_ref: Some(reference.clone()),
        amount: order.total,
        currency: order.currency.clone(),
        created_at: Utc::now(),
    };
    let payment = db.insert_payment(payment).await.unwrap();
    match db.settle_payment(payment.id, Some(&reference), Utc::now()).await.unwrap() {
        SettlementOutcome::Settled { payment, .. } => payment,
        other => panic!("Expected the payment to settle, got {other:?}"),
    }
}

/// Pays for the order and has the vendor ship and deliver it.
pub async fn deliver_order(db: &SqliteDatabase, order: &Order) -> Payment {
    let payment = pay_order(db, order).await;
    ship_and_deliver(db, order.id).await;
    payment
}

/// Has the vendor ship and deliver a paid shipping order.
pub async fn ship_and_deliver(db: &SqliteDatabase, order_id: i64) {
    let vendor = Actor::Vendor(VENDOR_OWNER.into());
    for status in [
        OrderStatusType::Processing,
        OrderStatusType::Packed,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
    ] {
        db.transition_order(order_id, status, &vendor, Utc::now()).await.unwrap();
    }
}

/// Opens a return on a delivered order, and has the vendor approve it and receive the goods. The order ends RETURNED.
pub async fn return_goods(db: &SqliteDatabase, order_id: i64, customer_id: &str) {
    let vendor = Actor::Vendor(VENDOR_OWNER.into());
    let opened = db.open_return(order_id, customer_id, "Does not fit", 30, Utc::now()).await.unwrap();
    db.review_return(opened.request.id, &vendor, true, Utc::now()).await.unwrap();
    let received = db.receive_return(opened.request.id, &vendor, Utc::now()).await.unwrap();
    assert_eq!(received.order.status, OrderStatusType::Returned);
}
