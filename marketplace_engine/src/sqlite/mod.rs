//! SQLite backend for the marketplace engine.
//!
//! Every state change runs in a `BEGIN IMMEDIATE` transaction, so concurrent writers queue up on the database lock
//! instead of racing on stock counts or payment states. The free functions in [`db`] are the individual queries; the
//! backend traits are implemented in terms of them by [`SqliteDatabase`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
