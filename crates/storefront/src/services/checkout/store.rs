//! Storage seam for the checkout engine.
//!
//! A [`Ledger`] opens units of work; a [`LedgerTx`] is one unit of work that
//! holds row locks until it is committed or dropped. Dropping a transaction
//! without calling [`LedgerTx::commit`] discards every write it made.

use async_trait::async_trait;
use thiserror::Error;

use ec_space_core::{AccountId, Credits, ItemId, OrderId, OrderStatus, Quantity};

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired in time.
    #[error("timed out waiting for a row lock")]
    LockTimeout,

    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend is temporarily unable to serve the request.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A guarded write matched no row although the row was locked.
    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    /// Non-recoverable backend failure.
    #[error("storage failure: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether retrying the whole unit of work may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LockTimeout | Self::Unavailable(_) => true,
            Self::Database(e) => crate::db::is_transient(e),
            Self::Invariant(_) | Self::Fatal(_) => false,
        }
    }
}

/// An account row held under an exclusive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct LockedAccount {
    pub id: AccountId,
    pub balance: Credits,
}

/// An item row held under an exclusive lock.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LockedItem {
    pub id: ItemId,
    pub name: String,
    pub unit_price: Credits,
    pub stock_count: i32,
}

/// A line to be written into an order, priced under the item lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLineDraft {
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub unit_price: Credits,
}

/// Which cart lines to delete when an order is recorded.
#[derive(Debug, Clone, Copy)]
pub enum CartClear<'a> {
    /// Every line of the account.
    All,
    /// Only the lines for these items.
    Items(&'a [ItemId]),
}

/// Opens units of work against the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Transaction type produced by [`Ledger::begin`].
    type Tx: LedgerTx;

    /// Start a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One unit of work. All writes become visible together on commit.
#[async_trait]
pub trait LedgerTx: Send {
    /// Lock an account row exclusively. `None` if the account does not exist.
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<LockedAccount>, StoreError>;

    /// Lock the given item rows in ascending id order and return the rows that
    /// exist, ordered by id. `ids` must be sorted and free of duplicates.
    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<LockedItem>, StoreError>;

    /// Subtract `amount` from a locked account and return the new balance.
    async fn debit(&mut self, id: AccountId, amount: Credits) -> Result<Credits, StoreError>;

    /// Insert an order header.
    async fn create_order(
        &mut self,
        account: AccountId,
        total: Credits,
        status: OrderStatus,
    ) -> Result<OrderId, StoreError>;

    /// Append a line to an order created in this unit of work.
    async fn add_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLineDraft,
    ) -> Result<(), StoreError>;

    /// Subtract `quantity` from a locked item's stock.
    async fn decrement_stock(&mut self, item: ItemId, quantity: Quantity)
    -> Result<(), StoreError>;

    /// Delete cart lines of an account.
    async fn clear_cart(
        &mut self,
        account: AccountId,
        which: CartClear<'_>,
    ) -> Result<(), StoreError>;

    /// Make every write of this unit of work visible and release its locks.
    async fn commit(self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::LockTimeout.is_transient());
        assert!(StoreError::Unavailable("connection reset".to_owned()).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Invariant("debit matched no row".to_owned()).is_transient());
        assert!(!StoreError::Fatal("disk full".to_owned()).is_transient());
    }
}
