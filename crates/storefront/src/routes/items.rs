//! Public catalog handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use ec_space_core::ItemId;

use crate::db::ItemRepository;
use crate::error::{AppError, Result};
use crate::models::Item;
use crate::state::AppState;

/// All items, ordered by id.
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Item>>> {
    Ok(Json(ItemRepository::new(state.pool()).list().await?))
}

/// One item.
pub async fn show(State(state): State<AppState>, Path(id): Path<ItemId>) -> Result<Json<Item>> {
    ItemRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item {id}")))
}
