use std::collections::HashMap;

use mkt_common::MinorUnits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub unit_amount: MinorUnits,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckoutSession {
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub shipping_amount: MinorUnits,
    pub tax_amount: MinorUnits,
    pub discount_amount: MinorUnits,
    pub success_url: String,
    pub cancel_url: String,
    /// Free-form metadata echoed back on every webhook for this session. The marketplace stores the order id here.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NewCheckoutSession {
    /// `sum(unit_amount * quantity) + shipping + tax - discount`
    pub fn line_items_total(&self) -> MinorUnits {
        let lines: MinorUnits = self.line_items.iter().map(|l| MinorUnits::from(l.unit_amount.value() * l.quantity)).sum();
        lines + self.shipping_amount + self.tax_amount - self.discount_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// What a refund is issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundTarget {
    PaymentIntent(String),
    Charge(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefund {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<MinorUnits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NewRefund {
    pub fn new(target: RefundTarget) -> Self {
        let (payment_intent, charge) = match target {
            RefundTarget::PaymentIntent(pi) => (Some(pi), None),
            RefundTarget::Charge(ch) => (None, Some(ch)),
        };
        Self { payment_intent, charge, amount: None, reason: None, metadata: HashMap::new() }
    }

    pub fn with_amount(mut self, amount: MinorUnits) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn target_description(&self) -> String {
        match (&self.payment_intent, &self.charge) {
            (Some(pi), _) => format!("payment intent {pi}"),
            (None, Some(ch)) => format!("charge {ch}"),
            (None, None) => "<no target>".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub charge: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_total() {
        let session = NewCheckoutSession {
            currency: "KES".into(),
            line_items: vec![
                CheckoutLineItem { name: "Mug".into(), unit_amount: MinorUnits::from(1000), quantity: 1 },
                CheckoutLineItem { name: "Coaster".into(), unit_amount: MinorUnits::from(500), quantity: 2 },
            ],
            shipping_amount: MinorUnits::from(300),
            tax_amount: MinorUnits::from(0),
            discount_amount: MinorUnits::from(0),
            success_url: "https://shop.local/ok".into(),
            cancel_url: "https://shop.local/cancel".into(),
            metadata: HashMap::new(),
        };
        assert_eq!(session.line_items_total(), MinorUnits::from(2300));
    }

    #[test]
    fn refund_serializes_only_its_target() {
        let refund = NewRefund::new(RefundTarget::Charge("ch_123".into()));
        let json = serde_json::to_value(&refund).unwrap();
        assert_eq!(json["charge"], "ch_123");
        assert!(json.get("payment_intent").is_none());
    }
}
