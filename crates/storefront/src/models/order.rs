//! Order history types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ec_space_core::{AccountId, Credits, ItemId, OrderId, OrderLineId, OrderStatus, Quantity};

/// An order header.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub total: Credits,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// A purchased line, priced at the moment of purchase.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: OrderLineId,
    #[serde(skip)]
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: Quantity,
    pub unit_price_at_purchase: Credits,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithLines {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// An order as seen by administrators, with the buyer's identity.
#[derive(Debug, Clone, Serialize)]
pub struct AdminOrderView {
    #[serde(flatten)]
    pub order: Order,
    pub username: String,
    pub address: Option<String>,
    pub lines: Vec<OrderLine>,
}
