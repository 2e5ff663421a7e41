//! HTTP route handlers for the storefront JSON API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (strict rate limit)
//! POST   /api/auth/register       - Create a customer account
//! POST   /api/auth/login          - Start a session
//! POST   /api/auth/logout         - End the session
//!
//! # Catalog
//! GET    /api/items               - All items, ordered by id
//! GET    /api/items/{id}          - One item
//!
//! # Account (requires auth)
//! GET    /api/profile             - Profile and credit balance
//! PATCH  /api/profile             - Update email and/or address
//! POST   /api/topup               - Add credits
//!
//! # Cart (requires auth)
//! GET    /api/cart                - Cart with current prices
//! POST   /api/cart                - Add units of an item
//! PUT    /api/cart/{item_id}      - Set the quantity of an item
//! DELETE /api/cart/{item_id}      - Remove an item
//!
//! # Orders (requires auth)
//! GET    /api/orders              - Own order history, newest first
//! POST   /api/orders              - Checkout
//!
//! # Admin (requires admin role)
//! GET    /api/admin/orders        - Every order with buyer identity
//! POST   /api/admin/items         - Create an item
//! PATCH  /api/admin/items/{id}    - Update or restock an item
//! DELETE /api/admin/items/{id}    - Delete an item without order history
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod items;
pub mod orders;

use axum::{
    Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
    routing::{get, patch, post, put},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejection renders as a `validation` error.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::orders))
        .route("/items", post(admin::create_item))
        .route(
            "/items/{id}",
            patch(admin::update_item).delete(admin::delete_item),
        )
}

/// Create the API routes router (everything except auth).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(items::index))
        .route("/items/{id}", get(items::show))
        .route("/profile", get(account::show).patch(account::update))
        .route("/topup", post(account::top_up))
        .route("/cart", get(cart::show).post(cart::add))
        .route("/cart/{item_id}", put(cart::set).delete(cart::remove))
        .route("/orders", get(orders::index).post(orders::checkout))
        .nest("/admin", admin_routes())
}
