//! # Marketplace server
//! This crate hosts the server for the marketplace engine. It is responsible for:
//! * Receiving payment provider webhooks and handing them to the engine's settlement core.
//! * Running the background workers: the job runner, the reservation expiry sweep and the weekly payout scheduler.
//! * Logging the notifications and realtime events the engine emits.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhooks/card-network`: Signed card network events (checkout completed, payment failed, charge refunded).
//! * `/webhooks/mobile-money/{provider}`: HMAC-authenticated mobile money callbacks.

pub mod cli;
pub mod config;
pub mod errors;

pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
