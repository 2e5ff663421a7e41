//! Cart types.

use serde::Serialize;

use ec_space_core::{Credits, ItemId, Quantity};

/// One cart line joined with the item's current price and stock.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub item_id: ItemId,
    pub name: String,
    pub unit_price: Credits,
    pub quantity: Quantity,
    /// Current stock. Advisory only, checkout re-checks under lock.
    pub available: i32,
}

/// A cart and its total at current prices.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Credits,
}

impl CartView {
    /// Build the view, pricing every line at its current unit price.
    #[must_use]
    pub fn new(lines: Vec<CartLine>) -> Self {
        let total = lines
            .iter()
            .filter_map(|line| line.unit_price.checked_mul(line.quantity))
            .sum();
        Self { lines, total }
    }
}
