//! Checkout error types.

use serde::Serialize;
use thiserror::Error;

use ec_space_core::{Credits, ItemId};

use super::store::StoreError;

/// Why a checkout did not produce an order.
///
/// Every variant leaves balances, stock, orders and the cart exactly as they
/// were before the request.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Malformed request, rejected before any storage access.
    #[error("invalid checkout request: {0}")]
    Validation(String),

    /// The authenticated account no longer exists.
    #[error("account not found")]
    AccountNotFound,

    /// A requested item does not exist.
    #[error("item {item_id} not found")]
    ItemNotFound { item_id: ItemId },

    /// The balance does not cover the order total.
    #[error("insufficient credits: have {balance}, need {required}")]
    InsufficientCredits { balance: Credits, required: Credits },

    /// Not enough units of an item remain.
    #[error("insufficient stock for {name}: {available} available, {requested} requested")]
    InsufficientStock {
        item_id: ItemId,
        name: String,
        available: i32,
        requested: i32,
    },

    /// The submitted total does not match current prices.
    #[error("price mismatch: submitted {claimed}, current total {actual}")]
    PriceMismatch { claimed: Credits, actual: Credits },

    /// Lock contention, timeout, or a dropped connection. Safe to retry.
    #[error("checkout temporarily unavailable: {0}")]
    Transient(String),

    /// Unexpected storage failure.
    #[error("checkout failed: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Short machine-readable kind used in API responses and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AccountNotFound | Self::ItemNotFound { .. } => "not_found",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::PriceMismatch { .. } => "price_mismatch",
            Self::Transient(_) => "transient",
            Self::Internal(_) => "internal",
        }
    }

    /// Business context attached to the error response.
    #[must_use]
    pub fn context(&self) -> Option<CheckoutErrorContext> {
        match self {
            Self::ItemNotFound { item_id } => Some(CheckoutErrorContext::Item { item_id: *item_id }),
            Self::InsufficientCredits { balance, required } => {
                Some(CheckoutErrorContext::Credits {
                    balance: *balance,
                    required: *required,
                })
            }
            Self::InsufficientStock {
                item_id,
                name,
                available,
                requested,
            } => Some(CheckoutErrorContext::Stock {
                item_id: *item_id,
                name: name.clone(),
                available: *available,
                requested: *requested,
            }),
            Self::PriceMismatch { claimed, actual } => Some(CheckoutErrorContext::Price {
                claimed: *claimed,
                actual: *actual,
            }),
            Self::Validation(_)
            | Self::AccountNotFound
            | Self::Transient(_)
            | Self::Internal(_) => None,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

/// Fields flattened into the JSON error body next to `error` and `message`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CheckoutErrorContext {
    Item {
        item_id: ItemId,
    },
    Credits {
        balance: Credits,
        required: Credits,
    },
    Stock {
        item_id: ItemId,
        name: String,
        available: i32,
        requested: i32,
    },
    Price {
        claimed: Credits,
        actual: Credits,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_split_into_transient_and_internal() {
        assert!(matches!(
            CheckoutError::from(StoreError::LockTimeout),
            CheckoutError::Transient(_)
        ));
        assert!(matches!(
            CheckoutError::from(StoreError::Fatal("boom".to_owned())),
            CheckoutError::Internal(_)
        ));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CheckoutError::AccountNotFound.kind(), "not_found");
        assert_eq!(
            CheckoutError::ItemNotFound {
                item_id: ItemId::new(3)
            }
            .kind(),
            "not_found"
        );
        assert_eq!(CheckoutError::Transient(String::new()).kind(), "transient");
    }

    #[test]
    fn test_stock_context_serializes_flat() {
        let err = CheckoutError::InsufficientStock {
            item_id: ItemId::new(4),
            name: "Ion Cannon".to_owned(),
            available: 1,
            requested: 3,
        };
        let json = serde_json::to_value(err.context()).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({
                "item_id": 4,
                "name": "Ion Cannon",
                "available": 1,
                "requested": 3
            }))
        );
    }
}
