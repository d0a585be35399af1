use std::str::FromStr;

use hmac::{Hmac, Mac};
use marketplace_engine::db_types::PaymentProvider;
use sha2::Sha256;

/// Base64-encoded HMAC-SHA256 of `data`, as the mobile money providers send it.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks a base64 signature against `data` in constant time. Undecodable signatures never match.
pub fn verify_hmac(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(&expected).is_ok()
        },
        Err(_) => false,
    }
}

/// Maps the `{provider}` path segment of a mobile money callback onto a synchronous provider. Accepts the short form
/// (`a`, `b`) as well as the stored name (`MOBILE_MONEY_A`, `mobile-money-b`).
pub fn parse_mobile_money_provider(segment: &str) -> Option<PaymentProvider> {
    let normalized = segment.trim().to_ascii_uppercase().replace('-', "_");
    let provider = match normalized.as_str() {
        "A" => PaymentProvider::MobileMoneyA,
        "B" => PaymentProvider::MobileMoneyB,
        s => PaymentProvider::from_str(s).ok()?,
    };
    provider.is_synchronous().then_some(provider)
}
