//! Inbound webhook handling for the card network.
//!
//! The provider signs every webhook with a header of the form `t=<unix seconds>,v1=<hex signature>`, where the
//! signature is `HMAC-SHA256(secret, "{t}.{raw body}")`. Several `v1` entries may be present while a secret is being
//! rotated; any one of them matching is sufficient.
use std::collections::HashMap;

use hmac::{Hmac, Mac};
use log::*;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::CardNetworkError;

pub const SIGNATURE_HEADER: &str = "Card-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded signature of `"{timestamp}.{payload}"`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mac = signed_mac(secret, timestamp, payload);
    hex::encode(mac.finalize().into_bytes())
}

/// A complete signature header value for `payload`, as the provider would send it.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign_payload(secret, timestamp, payload))
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take keys of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Verifies the signature header against the raw request body.
///
/// `tolerance_secs` bounds how far the signed timestamp may be from `now` (unix seconds). A tolerance of zero disables
/// the freshness check.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    tolerance_secs: i64,
    now: i64,
) -> Result<(), CardNetworkError> {
    if secret.is_empty() {
        return Err(CardNetworkError::NotConfigured("No webhook secret has been configured".into()));
    }
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {},
        }
    }
    let timestamp =
        timestamp.ok_or_else(|| CardNetworkError::InvalidSignature("Signature header has no timestamp".into()))?;
    if signatures.is_empty() {
        return Err(CardNetworkError::InvalidSignature("Signature header has no v1 signature".into()));
    }
    if tolerance_secs > 0 && now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(CardNetworkError::InvalidSignature(format!(
            "Timestamp {timestamp} is outside the tolerance of {tolerance_secs}s"
        )));
    }
    let matched = signatures.iter().any(|sig| match hex::decode(sig) {
        Ok(bytes) => signed_mac(secret, timestamp, payload).verify_slice(&bytes).is_ok(),
        Err(_) => false,
    });
    if matched {
        Ok(())
    } else {
        Err(CardNetworkError::InvalidSignature("No signature matched the payload".into()))
    }
}

//--------------------------------------   Webhook events   ---------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
struct EnvelopeData {
    object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCompleted {
    pub event_id: String,
    pub session_id: String,
    pub payment_intent: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFailed {
    pub event_id: String,
    pub payment_intent: String,
    pub failure_message: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRefunded {
    pub event_id: String,
    pub charge_id: String,
    pub payment_intent: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// The webhook kinds the marketplace acts on. Everything else is acknowledged and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    SessionCompleted(SessionCompleted),
    PaymentFailed(PaymentFailed),
    ChargeRefunded(ChargeRefunded),
    Ignored { event_id: String, event_type: String },
}

impl WebhookEvent {
    pub fn event_id(&self) -> &str {
        match self {
            Self::SessionCompleted(e) => &e.event_id,
            Self::PaymentFailed(e) => &e.event_id,
            Self::ChargeRefunded(e) => &e.event_id,
            Self::Ignored { event_id, .. } => event_id,
        }
    }

    pub fn metadata(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::SessionCompleted(e) => Some(&e.metadata),
            Self::PaymentFailed(e) => Some(&e.metadata),
            Self::ChargeRefunded(e) => Some(&e.metadata),
            Self::Ignored { .. } => None,
        }
    }
}

fn string_field(object: &Value, field: &str) -> Option<String> {
    object.get(field).and_then(Value::as_str).map(String::from)
}

fn required_field(object: &Value, field: &str, event_type: &str) -> Result<String, CardNetworkError> {
    string_field(object, field)
        .ok_or_else(|| CardNetworkError::MalformedWebhook(format!("{event_type} event is missing '{field}'")))
}

fn metadata(object: &Value) -> HashMap<String, String> {
    object
        .get("metadata")
        .and_then(Value::as_object)
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))).collect())
        .unwrap_or_default()
}

/// Parses a (previously verified) webhook body.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, CardNetworkError> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| CardNetworkError::MalformedWebhook(e.to_string()))?;
    let object = &envelope.data.object;
    let event_type = envelope.event_type.as_str();
    let event = match event_type {
        "checkout.session.completed" => WebhookEvent::SessionCompleted(SessionCompleted {
            event_id: envelope.id,
            session_id: required_field(object, "id", event_type)?,
            payment_intent: string_field(object, "payment_intent"),
            metadata: metadata(object),
        }),
        "payment_intent.payment_failed" => WebhookEvent::PaymentFailed(PaymentFailed {
            event_id: envelope.id,
            payment_intent: required_field(object, "id", event_type)?,
            failure_message: object
                .get("last_payment_error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from),
            metadata: metadata(object),
        }),
        "charge.refunded" => WebhookEvent::ChargeRefunded(ChargeRefunded {
            event_id: envelope.id,
            charge_id: required_field(object, "id", event_type)?,
            payment_intent: string_field(object, "payment_intent"),
            metadata: metadata(object),
        }),
        other => {
            debug!("Ignoring card network event {} of type {other}", envelope.id);
            WebhookEvent::Ignored { event_id: envelope.id, event_type: other.to_string() }
        },
    };
    Ok(event)
}

/// Verifies the signature and then parses the body.
pub fn verify_and_parse(
    secret: &str,
    header: &str,
    payload: &[u8],
    tolerance_secs: i64,
    now: i64,
) -> Result<WebhookEvent, CardNetworkError> {
    verify_signature(secret, header, payload, tolerance_secs, now)?;
    parse_event(payload)
}
