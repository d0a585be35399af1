use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use card_network_tools::{CardNetworkError, CheckoutSession, NewCheckoutSession, NewRefund, Refund};
use chrono::Utc;
use log::debug;
use marketplace_engine::{
    checkout::CheckoutRequest,
    db_types::{
        MinorUnits,
        NewPayment,
        NewProduct,
        NewVariant,
        NewVendor,
        Order,
        Payment,
        PaymentProvider,
        ProductStatus,
        VendorStatus,
    },
    events::EventProducers,
    test_utils::{prepare_test_env, random_db_path},
    CardNetworkClient,
    CatalogManagement,
    CheckoutApi,
    MarketplaceConfig,
    MarketplaceDatabase,
    PaymentApi,
    PaymentConfig,
    PaymentManagement,
    SqliteDatabase,
};
use mkt_common::Secret;
use mockall::mock;

use crate::{
    config::MobileMoneyWebhookConfig,
    server::{build_gateways, configure_webhooks},
};

pub const CARD_SECRET: &str = "whsec_server_test";
pub const MOBILE_MONEY_SECRET: &str = "mm_server_test";

mock! {
    pub CardClient {}
    impl CardNetworkClient for CardClient {
        async fn create_checkout_session(&self, session: &NewCheckoutSession)
            -> Result<CheckoutSession, CardNetworkError>;
        async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, CardNetworkError>;
        async fn create_refund(&self, refund: &NewRefund) -> Result<Refund, CardNetworkError>;
    }
}

pub async fn setup() -> SqliteDatabase {
    prepare_test_env(&random_db_path()).await
}

pub async fn tear_down(db: SqliteDatabase) {
    let path = db.url().trim_start_matches("sqlite://").to_string();
    db.close().await;
    let _ = std::fs::remove_file(path);
}

/// A PENDING_PAYMENT pickup order for 2 x 1000 KES.
pub async fn place_order(db: &SqliteDatabase) -> Order {
    let now = Utc::now();
    let vendor = db.create_vendor_application(NewVendor::new("vendor-owner", "Duka"), now).await.unwrap();
    db.set_vendor_status(vendor.id, VendorStatus::Approved, now).await.unwrap();
    let product = NewProduct { vendor_id: vendor.id, title: "Kiondo".into(), status: ProductStatus::Active };
    let product = db.create_product(product, now).await.unwrap();
    let variant = NewVariant {
        product_id: product.id,
        sku: "KIO-S".into(),
        price: MinorUnits::from(1000),
        currency: "KES".into(),
        stock_qty: 5,
    };
    let variant = db.create_variant(variant, now).await.unwrap();
    let pickup = db.add_pickup_location(vendor.id, "Kariakor market", now).await.unwrap();
    let checkout = CheckoutApi::new(db.clone(), EventProducers::default(), MarketplaceConfig::default());
    checkout.add_to_cart("alice", variant.id, 2).await.unwrap();
    checkout.checkout(&CheckoutRequest::pickup("alice", pickup.id)).await.unwrap().order
}

pub async fn insert_payment(db: &SqliteDatabase, order: &Order, provider: PaymentProvider, reference: &str) -> Payment {
    let payment = NewPayment {
        order_id: order.id,
        provider,
        provider_ref: Some(reference.to_string()),
        amount: order.total,
        currency: order.currency.clone(),
        created_at: Utc::now(),
    };
    db.insert_payment(payment).await.unwrap()
}

/// A payment API whose card client fails the test if it is ever called.
pub fn payment_api(db: &SqliteDatabase) -> PaymentApi<SqliteDatabase, MockCardClient> {
    let payments = PaymentConfig {
        checkout_success_url: "https://shop.test/ok".into(),
        checkout_cancel_url: "https://shop.test/cancel".into(),
        card_webhook_secret: Secret::from(CARD_SECRET),
        card_webhook_tolerance_secs: 300,
        mobile_money_enabled: true,
    };
    let gateways = build_gateways(MockCardClient::new(), &payments).unwrap();
    PaymentApi::new(db.clone(), Arc::new(gateways), EventProducers::default())
}

pub fn mobile_money_config(hmac_checks: bool) -> MobileMoneyWebhookConfig {
    MobileMoneyWebhookConfig { hmac_secret: Secret::from(MOBILE_MONEY_SECRET), hmac_checks }
}

/// Posts `body` to the webhook app and returns the status and body of the response, including responses produced
/// by middleware errors.
pub async fn post_webhook(
    db: &SqliteDatabase,
    mobile_money: MobileMoneyWebhookConfig,
    path: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> (StatusCode, String) {
    let api = payment_api(db);
    let app = App::new().configure(move |cfg| configure_webhooks(cfg, api, &mobile_money));
    let service = test::init_service(app).await;
    let mut req = TestRequest::post().uri(path).set_payload(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    debug!("Posting to {path}");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => (e.error_response().status(), e.to_string()),
    }
}
