//! Administration handlers: catalog maintenance and the order ledger.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use ec_space_core::ItemId;
use tracing::instrument;

use super::ApiJson;
use crate::db::{ItemRepository, OrderRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{AdminOrderView, Item, ItemUpdate, NewItem};
use crate::state::AppState;

/// Every order with the buyer's username and address, newest first.
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<AdminOrderView>>> {
    Ok(Json(OrderRepository::new(state.pool()).list_all().await?))
}

/// Add an item to the catalog.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, name = %body.name))]
pub async fn create_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<NewItem>,
) -> Result<impl IntoResponse> {
    let unit_price = body
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let item = ItemRepository::new(state.pool())
        .create(&body, unit_price)
        .await?;

    tracing::info!(item_id = %item.id, "Item created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// Partially update an item, including price changes and restocking.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ItemId>,
    ApiJson(body): ApiJson<ItemUpdate>,
) -> Result<Json<Item>> {
    let unit_price = body
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let item = ItemRepository::new(state.pool())
        .update(id, &body, unit_price)
        .await?;

    tracing::info!(item_id = %item.id, "Item updated");
    Ok(Json(item))
}

/// Delete an item. Refused when the item appears in order history.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ItemId>,
) -> Result<StatusCode> {
    ItemRepository::new(state.pool()).delete(id).await?;

    tracing::info!(item_id = %id, "Item deleted");
    Ok(StatusCode::NO_CONTENT)
}
