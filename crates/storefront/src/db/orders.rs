//! Order history queries.
//!
//! Orders are written only by checkout (see [`super::ledger`]); this module
//! reads them back without taking ledger locks.

use std::collections::HashMap;

use sqlx::PgPool;

use ec_space_core::{AccountId, OrderId};

use super::RepositoryError;
use crate::models::{AdminOrderView, Order, OrderLine, OrderWithLines};

#[derive(sqlx::FromRow)]
struct AdminOrderRow {
    #[sqlx(flatten)]
    order: Order,
    username: String,
    address: Option<String>,
}

/// Repository for reading orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// An account's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_by_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<OrderWithLines>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT id, account_id, total, status, created_at
             FROM orders
             WHERE account_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;

        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let mut lines = self.lines_for(&ids).await?;

        Ok(orders
            .into_iter()
            .map(|order| OrderWithLines {
                lines: lines.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    /// Every order with the buyer's username and address, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all(&self) -> Result<Vec<AdminOrderView>, RepositoryError> {
        let rows = sqlx::query_as::<_, AdminOrderRow>(
            "SELECT o.id, o.account_id, o.total, o.status, o.created_at, a.username, a.address
             FROM orders o
             JOIN account a ON a.id = o.account_id
             ORDER BY o.created_at DESC, o.id DESC",
        )
        .fetch_all(self.pool)
        .await?;

        let ids: Vec<OrderId> = rows.iter().map(|r| r.order.id).collect();
        let mut lines = self.lines_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| AdminOrderView {
                lines: lines.remove(&row.order.id).unwrap_or_default(),
                order: row.order,
                username: row.username,
                address: row.address,
            })
            .collect())
    }

    async fn lines_for(
        &self,
        orders: &[OrderId],
    ) -> Result<HashMap<OrderId, Vec<OrderLine>>, RepositoryError> {
        if orders.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, OrderLine>(
            "SELECT l.id, l.order_id, l.item_id, i.name AS item_name, l.quantity,
                    l.unit_price_at_purchase
             FROM order_line l
             JOIN item i ON i.id = l.item_id
             WHERE l.order_id = ANY($1)
             ORDER BY l.order_id, l.id",
        )
        .bind(orders)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for line in rows {
            grouped.entry(line.order_id).or_default().push(line);
        }
        Ok(grouped)
    }
}
