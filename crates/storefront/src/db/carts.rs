//! `PostgreSQL` cart store.

use async_trait::async_trait;
use sqlx::PgPool;

use ec_space_core::{AccountId, ItemId, Quantity};

use crate::models::CartLine;
use crate::services::cart::{CartStore, CartUpdate, resolve_quantity};
use crate::services::checkout::StoreError;

/// Cart lines stored in the `cart_line` table.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for CartRepository<'_> {
    async fn lines(&self, account: AccountId) -> Result<Vec<CartLine>, StoreError> {
        let lines = sqlx::query_as::<_, CartLine>(
            "SELECT c.item_id, i.name, i.unit_price, c.quantity, i.stock_count AS available
             FROM cart_line c
             JOIN item i ON i.id = c.item_id
             WHERE c.account_id = $1
             ORDER BY c.item_id",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;
        Ok(lines)
    }

    async fn quantity(
        &self,
        account: AccountId,
        item: ItemId,
    ) -> Result<Option<Quantity>, StoreError> {
        let quantity = sqlx::query_scalar::<_, Quantity>(
            "SELECT quantity FROM cart_line WHERE account_id = $1 AND item_id = $2",
        )
        .bind(account)
        .bind(item)
        .fetch_optional(self.pool)
        .await?;
        Ok(quantity)
    }

    async fn upsert(
        &self,
        account: AccountId,
        item: ItemId,
        update: CartUpdate,
    ) -> Result<Option<Quantity>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Quantity>(
            "SELECT quantity FROM cart_line WHERE account_id = $1 AND item_id = $2 FOR UPDATE",
        )
        .bind(account)
        .bind(item)
        .fetch_optional(&mut *tx)
        .await?;

        let next = match (current, update, resolve_quantity(current, update)) {
            // No row to lock yet: let the insert absorb a concurrent first add.
            (None, CartUpdate::Add(_), Some(delta)) => Some(
                sqlx::query_scalar::<_, Quantity>(
                    "INSERT INTO cart_line (account_id, item_id, quantity)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (account_id, item_id)
                     DO UPDATE SET quantity = cart_line.quantity + EXCLUDED.quantity
                     RETURNING quantity",
                )
                .bind(account)
                .bind(item)
                .bind(delta)
                .fetch_one(&mut *tx)
                .await?,
            ),
            (_, _, Some(quantity)) => {
                sqlx::query(
                    "INSERT INTO cart_line (account_id, item_id, quantity)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (account_id, item_id)
                     DO UPDATE SET quantity = EXCLUDED.quantity",
                )
                .bind(account)
                .bind(item)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
                Some(quantity)
            }
            (_, _, None) => {
                sqlx::query("DELETE FROM cart_line WHERE account_id = $1 AND item_id = $2")
                    .bind(account)
                    .bind(item)
                    .execute(&mut *tx)
                    .await?;
                None
            }
        };

        tx.commit().await?;
        Ok(next)
    }

    async fn remove(&self, account: AccountId, item: ItemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_line WHERE account_id = $1 AND item_id = $2")
            .bind(account)
            .bind(item)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, account: AccountId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_line WHERE account_id = $1")
            .bind(account)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
