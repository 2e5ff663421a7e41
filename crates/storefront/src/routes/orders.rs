//! Order history and checkout handlers.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::ApiJson;
use crate::db::OrderRepository;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::OrderWithLines;
use crate::services::{CheckoutLine, Receipt};
use crate::state::AppState;

/// Checkout request body.
///
/// `total` is what the client displayed; it must match the total computed
/// from current prices or the checkout is refused.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub total: Decimal,
    pub items: Vec<CheckoutLine>,
}

/// Own orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderWithLines>>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .list_by_account(user.id)
            .await?,
    ))
}

/// Place an order.
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<Json<Receipt>> {
    let receipt = state
        .checkout()
        .checkout(user.id, body.total, &body.items)
        .await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_id", &receipt.order_id.to_string())]),
    );
    Ok(Json(receipt))
}
