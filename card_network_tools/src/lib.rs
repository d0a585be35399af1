//! # Card network tools
//!
//! A thin client for the asynchronous card-network payment provider used by the marketplace.
//!
//! * [`CardNetworkApi`] issues the outbound calls: create a hosted checkout session, retrieve a session (to resolve
//!   its payment intent), and create refunds. Every request is bounded by the configured timeout; retries are the
//!   caller's decision.
//! * [`webhook`] verifies the `Card-Signature` header of inbound webhooks and parses the three event kinds the
//!   settlement core acts on.
mod api;
mod config;
mod error;

pub mod data_objects;
pub mod webhook;

pub use api::CardNetworkApi;
pub use config::CardNetworkConfig;
pub use data_objects::{CheckoutLineItem, CheckoutSession, NewCheckoutSession, NewRefund, Refund, RefundTarget};
pub use error::CardNetworkError;
