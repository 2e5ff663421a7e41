//! Catalog repository.
//!
//! Reads here never lock rows; checkout takes its own locks through the ledger.

use sqlx::PgPool;

use ec_space_core::{Credits, ItemId};

use super::RepositoryError;
use crate::models::{Item, ItemUpdate, NewItem};

const ITEM_COLUMNS: &str =
    "id, name, kind, description, power_level, unit_price, stock_count, created_at, updated_at";

/// Repository for catalog items.
pub struct ItemRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ItemRepository<'a> {
    /// Create a new item repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All items ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        let items =
            sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM item ORDER BY id"))
                .fetch_all(self.pool)
                .await?;
        Ok(items)
    }

    /// Get one item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let item = sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM item WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(item)
    }

    /// Find an item by exact name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Item>, RepositoryError> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM item WHERE name = $1 ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(item)
    }

    /// Insert an item. `unit_price` is the validated price of `new`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewItem, unit_price: Credits) -> Result<Item, RepositoryError> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "INSERT INTO item (name, kind, description, power_level, unit_price, stock_count)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(new.name.trim())
        .bind(new.kind.trim())
        .bind(&new.description)
        .bind(new.power_level)
        .bind(unit_price)
        .bind(new.stock_count)
        .fetch_one(self.pool)
        .await?;
        Ok(item)
    }

    /// Apply a partial update. Restocking goes through here.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    pub async fn update(
        &self,
        id: ItemId,
        update: &ItemUpdate,
        unit_price: Option<Credits>,
    ) -> Result<Item, RepositoryError> {
        sqlx::query_as::<_, Item>(&format!(
            "UPDATE item
             SET name = COALESCE($2, name),
                 kind = COALESCE($3, kind),
                 description = COALESCE($4, description),
                 power_level = COALESCE($5, power_level),
                 unit_price = COALESCE($6, unit_price),
                 stock_count = COALESCE($7, stock_count),
                 updated_at = now()
             WHERE id = $1
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.kind.as_deref().map(str::trim))
        .bind(update.description.as_deref())
        .bind(update.power_level)
        .bind(unit_price)
        .bind(update.stock_count)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete an item and any cart lines that reference it.
    ///
    /// Items that appear in order history are kept so past orders stay intact.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    /// Returns `RepositoryError::Conflict` if order lines reference the item.
    pub async fn delete(&self, id: ItemId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Waits for any checkout currently holding the row
        let locked: Option<ItemId> = sqlx::query_scalar("SELECT id FROM item WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let sold: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_line WHERE item_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if sold {
            return Err(RepositoryError::Conflict(
                "item has order history and cannot be deleted".to_owned(),
            ));
        }

        sqlx::query("DELETE FROM cart_line WHERE item_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM item WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
