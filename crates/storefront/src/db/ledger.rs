//! `PostgreSQL` ledger used by the checkout engine.
//!
//! Every unit of work is one database transaction with `lock_timeout` and
//! `statement_timeout` set locally, so a checkout stuck behind a lock fails
//! with SQLSTATE 55P03 instead of waiting indefinitely.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use ec_space_core::{AccountId, Credits, ItemId, OrderId, OrderStatus, Quantity};

use crate::config::CheckoutConfig;
use crate::services::checkout::{
    CartClear, Ledger, LedgerTx, LockedAccount, LockedItem, OrderLineDraft, StoreError,
};

/// Ledger backed by a `PgPool`.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PgLedger {
    /// Create a ledger that applies the checkout timeouts to every transaction.
    #[must_use]
    pub const fn new(pool: PgPool, config: &CheckoutConfig) -> Self {
        Self {
            pool,
            lock_timeout: config.lock_timeout,
            statement_timeout: config.timeout,
        }
    }
}

/// One checkout transaction. Rolled back on drop unless committed.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

fn millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

#[async_trait]
impl Ledger for PgLedger {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)")
            .bind(millis(self.lock_timeout))
            .bind(millis(self.statement_timeout))
            .execute(&mut *tx)
            .await?;

        Ok(PgLedgerTx { tx })
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<LockedAccount>, StoreError> {
        let account = sqlx::query_as::<_, LockedAccount>(
            "SELECT id, balance FROM account WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(account)
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<LockedItem>, StoreError> {
        let items = sqlx::query_as::<_, LockedItem>(
            "SELECT id, name, unit_price, stock_count
             FROM item
             WHERE id = ANY($1)
             ORDER BY id
             FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(items)
    }

    async fn debit(&mut self, id: AccountId, amount: Credits) -> Result<Credits, StoreError> {
        sqlx::query_scalar::<_, Credits>(
            "UPDATE account
             SET balance = balance - $2, updated_at = now()
             WHERE id = $1 AND balance >= $2
             RETURNING balance",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::Invariant(format!("debit of {amount} from account {id} matched no row")))
    }

    async fn create_order(
        &mut self,
        account: AccountId,
        total: Credits,
        status: OrderStatus,
    ) -> Result<OrderId, StoreError> {
        let id = sqlx::query_scalar::<_, OrderId>(
            "INSERT INTO orders (account_id, total, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(account)
        .bind(total)
        .bind(status)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn add_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLineDraft,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_line (order_id, item_id, quantity, unit_price_at_purchase)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(order)
        .bind(line.item_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        item: ItemId,
        quantity: Quantity,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE item
             SET stock_count = stock_count - $2, updated_at = now()
             WHERE id = $1 AND stock_count >= $2",
        )
        .bind(item)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Invariant(format!(
                "stock decrement of {quantity} for item {item} matched no row"
            )));
        }
        Ok(())
    }

    async fn clear_cart(
        &mut self,
        account: AccountId,
        which: CartClear<'_>,
    ) -> Result<(), StoreError> {
        match which {
            CartClear::All => {
                sqlx::query("DELETE FROM cart_line WHERE account_id = $1")
                    .bind(account)
                    .execute(&mut *self.tx)
                    .await?;
            }
            CartClear::Items(items) => {
                sqlx::query("DELETE FROM cart_line WHERE account_id = $1 AND item_id = ANY($2)")
                    .bind(account)
                    .bind(items)
                    .execute(&mut *self.tx)
                    .await?;
            }
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        // Commit is all-or-nothing on the server; report failures as retryable
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("commit failed: {e}")))
    }
}
