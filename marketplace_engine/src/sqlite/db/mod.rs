//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an [`ImmediateTransaction`] and call through to the
//! functions without any other changes.
use std::{
    env,
    ops::{Deref, DerefMut},
    str::FromStr,
    time::Duration,
};

use log::*;
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    Sqlite,
    SqliteConnection,
    SqlitePool,
};

pub mod catalog;
pub mod jobs;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod payouts;
pub mod returns;
pub mod stock;

const SQLITE_DB_URL: &str = "sqlite://data/marketplace.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("MKT_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ MKT_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a pool in WAL mode with foreign keys enforced. Writers wait up to the busy timeout for the write lock instead
/// of failing straight away.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// A write transaction opened with `BEGIN IMMEDIATE`.
///
/// SQLite's default deferred transactions take the write lock on the first write, which fails outright when another
/// connection wrote in the meantime. An immediate transaction takes the write lock up front, so concurrent writers
/// queue on the busy timeout instead.
///
/// Dropping an uncommitted transaction closes its connection rather than returning it to the pool, which rolls the
/// transaction back.
pub struct ImmediateTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl ImmediateTransaction {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, SqlxError> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    /// On failure the transaction is dropped, and with it rolled back.
    pub async fn commit(mut self) -> Result<(), SqlxError> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), SqlxError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &str) -> Result<(), SqlxError> {
        if let Some(conn) = self.conn.as_deref_mut() {
            sqlx::query(statement).execute(conn).await?;
        }
        // Back to the pool, outside of any transaction
        self.conn.take();
        Ok(())
    }
}

impl Deref for ImmediateTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("transaction connection is only taken on commit or rollback")
    }
}

impl DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("transaction connection is only taken on commit or rollback")
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            trace!("🗃️ Rolling back unfinished transaction");
            // Closing the connection discards the open transaction
            drop(conn.detach());
        }
    }
}
