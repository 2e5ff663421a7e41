//! Catalog item types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ec_space_core::{Credits, ItemId};

/// A catalog item with its live price and stock.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub power_level: i32,
    pub unit_price: Credits,
    pub stock_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new catalog item.
///
/// Also the record format of `ecs-cli seed items`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub power_level: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub stock_count: i32,
}

/// Partial update of a catalog item. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub power_level: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub stock_count: Option<i32>,
}

/// Item field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidItem(pub String);

fn check_name(name: &str) -> Result<(), InvalidItem> {
    if name.trim().is_empty() {
        return Err(InvalidItem("name cannot be empty".to_owned()));
    }
    Ok(())
}

fn check_price(price: Decimal) -> Result<Credits, InvalidItem> {
    let price = Credits::new(price).map_err(|e| InvalidItem(format!("unit_price: {e}")))?;
    if price.is_zero() {
        return Err(InvalidItem("unit_price must be greater than zero".to_owned()));
    }
    Ok(price)
}

fn check_stock(stock: i32) -> Result<(), InvalidItem> {
    if stock < 0 {
        return Err(InvalidItem("stock_count cannot be negative".to_owned()));
    }
    Ok(())
}

impl NewItem {
    /// Validate the fields and return the parsed unit price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` for an empty name or kind, a non-positive price,
    /// or negative stock.
    pub fn validate(&self) -> Result<Credits, InvalidItem> {
        check_name(&self.name)?;
        if self.kind.trim().is_empty() {
            return Err(InvalidItem("kind cannot be empty".to_owned()));
        }
        check_stock(self.stock_count)?;
        check_price(self.unit_price)
    }
}

impl ItemUpdate {
    /// Validate the present fields and return the parsed unit price, if any.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` if no field is set or a present field is invalid.
    pub fn validate(&self) -> Result<Option<Credits>, InvalidItem> {
        if self.name.is_none()
            && self.kind.is_none()
            && self.description.is_none()
            && self.power_level.is_none()
            && self.unit_price.is_none()
            && self.stock_count.is_none()
        {
            return Err(InvalidItem("no fields to update".to_owned()));
        }
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(stock) = self.stock_count {
            check_stock(stock)?;
        }
        self.unit_price.map(check_price).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laser() -> NewItem {
        NewItem {
            name: "Laser Blaster".to_owned(),
            kind: "weapon".to_owned(),
            description: String::new(),
            power_level: 40,
            unit_price: Decimal::new(5000, 2),
            stock_count: 5,
        }
    }

    #[test]
    fn test_new_item_valid() {
        assert_eq!(laser().validate().ok().map(|p| p.to_string()), Some("50.00".to_owned()));
    }

    #[test]
    fn test_new_item_rejects_zero_price_and_negative_stock() {
        let mut item = laser();
        item.unit_price = Decimal::ZERO;
        assert!(item.validate().is_err());

        let mut item = laser();
        item.stock_count = -1;
        assert!(item.validate().is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(ItemUpdate::default().validate().is_err());
    }

    #[test]
    fn test_restock_only_update() {
        let update = ItemUpdate {
            stock_count: Some(12),
            ..ItemUpdate::default()
        };
        assert_eq!(update.validate(), Ok(None));
    }
}
