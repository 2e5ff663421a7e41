//! Persistent cart operations.
//!
//! Stock checks here are advisory: they reject obviously impossible carts
//! early, but checkout re-validates everything under row locks.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use ec_space_core::{AccountId, ItemId, Quantity};

use super::checkout::StoreError;
use crate::db::{CartRepository, ItemRepository, RepositoryError};
use crate::models::{CartLine, CartView, Item};

/// How a cart line changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartUpdate {
    /// Add (or with a negative value, remove) units.
    Add(i32),
    /// Replace the quantity.
    Set(i32),
}

/// Apply `update` to the current quantity of a line.
///
/// `None` means the line should not exist afterwards.
#[must_use]
pub fn resolve_quantity(current: Option<Quantity>, update: CartUpdate) -> Option<Quantity> {
    let next = match update {
        CartUpdate::Add(delta) => {
            i64::from(current.map_or(0, |q| q.get())) + i64::from(delta)
        }
        CartUpdate::Set(quantity) => i64::from(quantity),
    };
    let clamped = i32::try_from(next).unwrap_or(i32::MAX);
    Quantity::new(clamped).ok()
}

/// Durable mapping of (account, item) to quantity.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Lines of an account's cart, ordered by item id.
    async fn lines(&self, account: AccountId) -> Result<Vec<CartLine>, StoreError>;

    /// Quantity of one item in the cart.
    async fn quantity(
        &self,
        account: AccountId,
        item: ItemId,
    ) -> Result<Option<Quantity>, StoreError>;

    /// Change a line and return its new quantity (`None` once deleted).
    async fn upsert(
        &self,
        account: AccountId,
        item: ItemId,
        update: CartUpdate,
    ) -> Result<Option<Quantity>, StoreError>;

    /// Delete a line. Returns `false` if it did not exist.
    async fn remove(&self, account: AccountId, item: ItemId) -> Result<bool, StoreError>;

    /// Delete every line of the account. Returns the number of lines removed.
    async fn clear(&self, account: AccountId) -> Result<u64, StoreError>;
}

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity is out of range.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The item does not exist.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// The item is not in the cart.
    #[error("item {0} is not in the cart")]
    NotInCart(ItemId),

    /// More units requested than are in stock.
    #[error("only {available} of {name} in stock, {requested} requested")]
    ExceedsStock {
        item_id: ItemId,
        name: String,
        available: i32,
        requested: i64,
    },

    /// Cart storage failed.
    #[error("cart store error: {0}")]
    Store(#[from] StoreError),

    /// Catalog lookup failed.
    #[error("catalog error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Reject a cart quantity that exceeds the item's current stock.
///
/// # Errors
///
/// Returns `CartError::ExceedsStock` if `requested` is above `stock_count`.
pub fn check_stock(item: &Item, requested: i64) -> Result<(), CartError> {
    if requested > i64::from(item.stock_count) {
        return Err(CartError::ExceedsStock {
            item_id: item.id,
            name: item.name.clone(),
            available: item.stock_count,
            requested,
        });
    }
    Ok(())
}

/// Cart service backed by `PostgreSQL`.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    items: ItemRepository<'a>,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            carts: CartRepository::new(pool),
            items: ItemRepository::new(pool),
        }
    }

    /// The account's cart priced at current prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Store` if the cart cannot be read.
    pub async fn view(&self, account: AccountId) -> Result<CartView, CartError> {
        Ok(CartView::new(self.carts.lines(account).await?))
    }

    /// Add `quantity` units of an item.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for quantities below one, `ItemNotFound` for
    /// unknown items, and `ExceedsStock` when the resulting line would exceed
    /// current stock.
    pub async fn add(
        &self,
        account: AccountId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let quantity =
            Quantity::try_from(quantity).map_err(|e| CartError::InvalidQuantity(e.to_string()))?;
        let item = self
            .items
            .get(item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;

        let current = self.carts.quantity(account, item_id).await?;
        let requested = i64::from(current.map_or(0, |q| q.get())) + i64::from(quantity.get());
        check_stock(&item, requested)?;

        self.carts
            .upsert(account, item_id, CartUpdate::Add(quantity.get()))
            .await?;
        self.view(account).await
    }

    /// Replace the quantity of an item. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for negative quantities, `ItemNotFound` for
    /// unknown items, and `ExceedsStock` when `quantity` exceeds stock.
    pub async fn set(
        &self,
        account: AccountId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity(
                "quantity cannot be negative".to_owned(),
            ));
        }
        if quantity == 0 {
            self.carts.remove(account, item_id).await?;
            return self.view(account).await;
        }

        let item = self
            .items
            .get(item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;
        check_stock(&item, quantity)?;

        let quantity =
            i32::try_from(quantity).map_err(|e| CartError::InvalidQuantity(e.to_string()))?;
        self.carts
            .upsert(account, item_id, CartUpdate::Set(quantity))
            .await?;
        self.view(account).await
    }

    /// Remove an item from the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the line does not exist.
    pub async fn remove(&self, account: AccountId, item_id: ItemId) -> Result<CartView, CartError> {
        if !self.carts.remove(account, item_id).await? {
            return Err(CartError::NotInCart(item_id));
        }
        self.view(account).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn item(stock_count: i32) -> Item {
        Item {
            id: ItemId::new(1),
            name: "Plasma Rifle".to_owned(),
            kind: "weapon".to_owned(),
            description: String::new(),
            power_level: 70,
            unit_price: "120.00".parse().unwrap(),
            stock_count,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_to_missing_line_creates_it() {
        assert_eq!(
            resolve_quantity(None, CartUpdate::Add(2)),
            Quantity::new(2).ok()
        );
    }

    #[test]
    fn test_add_accumulates() {
        assert_eq!(
            resolve_quantity(Quantity::new(3).ok(), CartUpdate::Add(2)),
            Quantity::new(5).ok()
        );
    }

    #[test]
    fn test_quantity_reaching_zero_deletes_line() {
        assert_eq!(resolve_quantity(Quantity::new(2).ok(), CartUpdate::Add(-2)), None);
        assert_eq!(resolve_quantity(Quantity::new(2).ok(), CartUpdate::Add(-9)), None);
        assert_eq!(resolve_quantity(Quantity::new(2).ok(), CartUpdate::Set(0)), None);
        assert_eq!(resolve_quantity(None, CartUpdate::Set(-1)), None);
    }

    #[test]
    fn test_set_replaces() {
        assert_eq!(
            resolve_quantity(Quantity::new(7).ok(), CartUpdate::Set(1)),
            Some(Quantity::ONE)
        );
    }

    #[test]
    fn test_add_saturates_instead_of_overflowing() {
        assert_eq!(
            resolve_quantity(Quantity::new(i32::MAX).ok(), CartUpdate::Add(5)),
            Quantity::new(i32::MAX).ok()
        );
    }

    #[test]
    fn test_check_stock() {
        assert!(check_stock(&item(3), 3).is_ok());
        let err = check_stock(&item(3), 4).unwrap_err();
        assert!(matches!(
            err,
            CartError::ExceedsStock {
                available: 3,
                requested: 4,
                ..
            }
        ));
    }
}
