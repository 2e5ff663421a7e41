//! Cart handlers.
//!
//! The cart lives in the database and is keyed by account. Stock checks here
//! are advisory; checkout re-checks under row locks.

use axum::{
    Json,
    extract::{Path, State},
};
use ec_space_core::ItemId;
use serde::Deserialize;
use tracing::instrument;

use super::ApiJson;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::CartView;
use crate::services::CartService;
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Set-quantity body.
#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i64,
}

/// The cart priced at current prices.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(state.pool()).view(user.id).await?))
}

/// Add units of an item.
#[instrument(skip(state, user, body), fields(account_id = %user.id, item_id = %body.item_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<AddToCart>,
) -> Result<Json<CartView>> {
    let cart = CartService::new(state.pool())
        .add(user.id, body.item_id, body.quantity)
        .await?;

    add_breadcrumb(
        "cart",
        "Added item to cart",
        Some(&[("item_id", &body.item_id.to_string())]),
    );
    Ok(Json(cart))
}

/// Replace the quantity of an item. Zero removes the line.
#[instrument(skip(state, user, body), fields(account_id = %user.id))]
pub async fn set(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<ItemId>,
    ApiJson(body): ApiJson<SetQuantity>,
) -> Result<Json<CartView>> {
    let cart = CartService::new(state.pool())
        .set(user.id, item_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove an item from the cart.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<ItemId>,
) -> Result<Json<CartView>> {
    Ok(Json(
        CartService::new(state.pool())
            .remove(user.id, item_id)
            .await?,
    ))
}
