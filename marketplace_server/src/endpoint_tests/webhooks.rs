use actix_web::http::StatusCode;
use card_network_tools::webhook::signature_header;
use chrono::Utc;
use marketplace_engine::{
    db_types::{OrderStatusType, PaymentProvider, PaymentStatus},
    OrderManagement,
    PaymentManagement,
};
use serde_json::{json, Value};

use super::helpers::*;
use crate::{helpers::calculate_hmac, middleware::MOBILE_MONEY_HMAC_HEADER, routes::CARD_SIGNATURE_HEADER};

fn session_completed(event_id: &str, order_id: i64) -> Vec<u8> {
    let event = json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": format!("cs_test_{order_id}"),
            "payment_intent": format!("pi_test_{order_id}"),
            "metadata": { "order_id": order_id.to_string() }
        }}
    });
    serde_json::to_vec(&event).unwrap()
}

fn callback(reference: &str, succeeded: bool) -> Vec<u8> {
    serde_json::to_vec(&json!({ "reference": reference, "succeeded": succeeded })).unwrap()
}

#[actix_web::test]
async fn card_webhook_needs_a_signature() {
    let db = setup().await;
    let order = place_order(&db).await;
    let body = session_completed("evt_1", order.id);
    let (status, _) = post_webhook(&db, mobile_money_config(true), "/webhooks/card-network", &[], body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let forged = signature_header("not_the_secret", Utc::now().timestamp(), &body);
    let headers = [(CARD_SIGNATURE_HEADER, forged.as_str())];
    let (status, body) = post_webhook(&db, mobile_money_config(true), "/webhooks/card-network", &headers, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid webhook"));
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::PendingPayment);
    tear_down(db).await;
}

#[actix_web::test]
async fn card_webhook_settles_once() -> anyhow::Result<()> {
    let db = setup().await;
    let order = place_order(&db).await;
    let payment = insert_payment(&db, &order, PaymentProvider::CardNetwork, &format!("cs_test_{}", order.id)).await;
    let body = session_completed("evt_2", order.id);
    let signature = signature_header(CARD_SECRET, Utc::now().timestamp(), &body);
    let headers = [(CARD_SIGNATURE_HEADER, signature.as_str())];

    let (status, response) =
        post_webhook(&db, mobile_money_config(true), "/webhooks/card-network", &headers, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let receipt: Value = serde_json::from_str(&response)?;
    assert_eq!(receipt["action"], "settled");
    assert_eq!(receipt["event_id"], "evt_2");
    assert_eq!(receipt["payment_id"], payment.id);
    assert_eq!(db.fetch_order(order.id).await?.unwrap().status, OrderStatusType::Paid);

    // Providers redeliver. The replay is acknowledged with a 200 so that they stop.
    let (status, response) =
        post_webhook(&db, mobile_money_config(true), "/webhooks/card-network", &headers, body).await;
    assert_eq!(status, StatusCode::OK);
    let receipt: Value = serde_json::from_str(&response)?;
    assert_eq!(receipt["action"], "already_processed");
    assert_eq!(db.fetch_ledger_entries_for_order(order.id).await?.len(), 1);
    tear_down(db).await;
    Ok(())
}

#[actix_web::test]
async fn mobile_money_callbacks_need_a_valid_hmac() {
    let db = setup().await;
    let order = place_order(&db).await;
    insert_payment(&db, &order, PaymentProvider::MobileMoneyA, "mma_0123456789abcdef01234567").await;
    let body = callback("mma_0123456789abcdef01234567", true);
    let path = "/webhooks/mobile-money/a";
    let (status, _) = post_webhook(&db, mobile_money_config(true), path, &[], body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let wrong = calculate_hmac("not_the_secret", &body);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, wrong.as_str())];
    let (status, _) = post_webhook(&db, mobile_money_config(true), path, &headers, body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, "%%% not base64 %%%")];
    let (status, _) = post_webhook(&db, mobile_money_config(true), path, &headers, body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(db.fetch_order(order.id).await.unwrap().unwrap().status, OrderStatusType::PendingPayment);
    tear_down(db).await;
}

#[actix_web::test]
async fn signed_mobile_money_callback_pays_the_order() -> anyhow::Result<()> {
    let db = setup().await;
    let order = place_order(&db).await;
    let reference = "mma_0123456789abcdef01234567";
    let payment = insert_payment(&db, &order, PaymentProvider::MobileMoneyA, reference).await;
    let body = callback(reference, true);
    let hmac = calculate_hmac(MOBILE_MONEY_SECRET, &body);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, hmac.as_str())];
    let path = "/webhooks/mobile-money/a";

    let (status, response) = post_webhook(&db, mobile_money_config(true), path, &headers, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&response)?;
    assert_eq!(result["payment_id"], payment.id);
    assert_eq!(result["payment_status"], "SUCCEEDED");
    assert_eq!(result["order_status"], "PAID");
    assert_eq!(result["duplicate"], false);

    let (status, response) = post_webhook(&db, mobile_money_config(true), path, &headers, body).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&response)?;
    assert_eq!(result["duplicate"], true);
    let payment = db.fetch_payment(payment.id).await?.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    tear_down(db).await;
    Ok(())
}

#[actix_web::test]
async fn mobile_money_callback_errors() {
    let db = setup().await;
    let order = place_order(&db).await;
    // Unknown provider segment
    let body = callback("mma_0123456789abcdef01234567", true);
    let hmac = calculate_hmac(MOBILE_MONEY_SECRET, &body);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, hmac.as_str())];
    let path = "/webhooks/mobile-money/card_network";
    let (status, _) = post_webhook(&db, mobile_money_config(true), path, &headers, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A reference nobody issued
    let body = callback("mmb_ffffffffffffffffffffffff", false);
    let hmac = calculate_hmac(MOBILE_MONEY_SECRET, &body);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, hmac.as_str())];
    let (status, _) = post_webhook(&db, mobile_money_config(true), "/webhooks/mobile-money/b", &headers, body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Not a callback at all
    let body = b"{\"ref\": 1}".to_vec();
    let hmac = calculate_hmac(MOBILE_MONEY_SECRET, &body);
    let headers = [(MOBILE_MONEY_HMAC_HEADER, hmac.as_str())];
    let (status, _) = post_webhook(&db, mobile_money_config(true), "/webhooks/mobile-money/b", &headers, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(db.fetch_order(order.id).await.unwrap().unwrap().status, OrderStatusType::PendingPayment);
    tear_down(db).await;
}

#[actix_web::test]
async fn hmac_checks_can_be_switched_off() {
    let db = setup().await;
    let order = place_order(&db).await;
    let reference = "mmb_0123456789abcdef01234567";
    insert_payment(&db, &order, PaymentProvider::MobileMoneyB, reference).await;
    let body = callback(reference, false);
    let (status, response) = post_webhook(&db, mobile_money_config(false), "/webhooks/mobile-money/b", &[], body).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(result["payment_status"], "FAILED");
    assert_eq!(result["order_status"], "CANCELED");
    tear_down(db).await;
}
