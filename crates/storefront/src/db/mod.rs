//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `account` / `account_password` - Customers and administrators
//! - `item` - Catalog with live price and stock
//! - `cart_line` - Persistent per-account carts
//! - `orders` / `order_line` - Append-only purchase history
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p ec-space-cli -- migrate
//! ```

pub mod accounts;
pub mod carts;
pub mod items;
pub mod ledger;
pub mod memory;
pub mod orders;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use accounts::AccountRepository;
pub use carts::CartRepository;
pub use items::ItemRepository;
pub use ledger::PgLedger;
pub use memory::{FaultPoint, MemoryStore};
pub use orders::OrderRepository;

/// SQLSTATE codes that mean "try again": lock timeout, serialization
/// failure, deadlock, and statement cancellation.
const TRANSIENT_SQLSTATES: &[&str] = &["55P03", "40001", "40P01", "57014"];

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Conflict with existing data (e.g., unique constraint violation).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(e) if is_transient(e))
    }
}

/// Classify a `sqlx` error as transient.
#[must_use]
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        _ => false,
    }
}

/// Returns the violated constraint name for unique violations.
fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    if let sqlx::Error::Database(db_err) = err
        && db_err.is_unique_violation()
    {
        return Some(db_err.constraint().unwrap_or_default());
    }
    None
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::Conflict("taken".to_owned()).is_transient());
    }
}
