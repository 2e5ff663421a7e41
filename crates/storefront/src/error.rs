//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as a JSON body
//! `{"error": <kind>, "message": <text>, ...context}` where `kind` is a stable
//! machine-readable string. Server faults are captured to Sentry and their
//! details are never sent to the client.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{AuthError, CartError, CheckoutError};

const INTERNAL_MESSAGE: &str = "Internal server error";
const TRANSIENT_MESSAGE: &str = "Service temporarily unavailable, please retry";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout did not produce an order.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rendered form of an error.
struct Rendered {
    status: StatusCode,
    kind: &'static str,
    message: String,
    context: Option<Value>,
}

impl Rendered {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            context: None,
        }
    }

    fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL_MESSAGE)
    }

    fn transient() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "transient", TRANSIENT_MESSAGE)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    context: Option<&'a Value>,
}

fn render_repository(err: &RepositoryError) -> Rendered {
    match err {
        RepositoryError::NotFound => Rendered::new(StatusCode::NOT_FOUND, "not_found", "Not found"),
        RepositoryError::Conflict(msg) => Rendered::new(StatusCode::CONFLICT, "conflict", msg.as_str()),
        err if err.is_transient() => Rendered::transient(),
        _ => Rendered::internal(),
    }
}

fn render_auth(err: &AuthError) -> Rendered {
    match err {
        AuthError::InvalidUsername(_) | AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        AuthError::InvalidCredentials => {
            Rendered::new(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid credentials")
        }
        AuthError::AlreadyExists(msg) => Rendered::new(StatusCode::CONFLICT, "conflict", msg.as_str()),
        AuthError::Repository(err) => render_repository(err),
        AuthError::PasswordHash => Rendered::internal(),
    }
}

fn render_cart(err: &CartError) -> Rendered {
    match err {
        CartError::InvalidQuantity(_) => {
            Rendered::new(StatusCode::BAD_REQUEST, "validation", err.to_string())
        }
        CartError::ItemNotFound(item_id) | CartError::NotInCart(item_id) => {
            Rendered::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
                .with_context(json!({ "item_id": item_id }))
        }
        CartError::ExceedsStock {
            item_id,
            name,
            available,
            requested,
        } => Rendered::new(StatusCode::CONFLICT, "insufficient_stock", err.to_string()).with_context(
            json!({
                "item_id": item_id,
                "name": name,
                "available": available,
                "requested": requested,
            }),
        ),
        CartError::Store(err) if err.is_transient() => Rendered::transient(),
        CartError::Store(_) => Rendered::internal(),
        CartError::Repository(err) => render_repository(err),
    }
}

fn render_checkout(err: &CheckoutError) -> Rendered {
    let status = match err {
        CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
        CheckoutError::AccountNotFound | CheckoutError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::InsufficientStock { .. } | CheckoutError::PriceMismatch { .. } => {
            StatusCode::CONFLICT
        }
        CheckoutError::Transient(_) => return Rendered::transient(),
        CheckoutError::Internal(_) => return Rendered::internal(),
    };

    let rendered = Rendered::new(status, err.kind(), err.to_string());
    match err.context().and_then(|ctx| serde_json::to_value(ctx).ok()) {
        Some(context) => rendered.with_context(context),
        None => rendered,
    }
}

impl AppError {
    fn render(&self) -> Rendered {
        match self {
            Self::Database(err) => render_repository(err),
            Self::Auth(err) => render_auth(err),
            Self::Cart(err) => render_cart(err),
            Self::Checkout(err) => render_checkout(err),
            Self::NotFound(msg) => Rendered::new(StatusCode::NOT_FOUND, "not_found", msg.as_str()),
            Self::Unauthorized(msg) => {
                Rendered::new(StatusCode::UNAUTHORIZED, "unauthorized", msg.as_str())
            }
            Self::Forbidden(msg) => Rendered::new(StatusCode::FORBIDDEN, "forbidden", msg.as_str()),
            Self::BadRequest(msg) => Rendered::new(StatusCode::BAD_REQUEST, "validation", msg.as_str()),
            Self::Conflict(msg) => Rendered::new(StatusCode::CONFLICT, "conflict", msg.as_str()),
            Self::RateLimited => {
                Rendered::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests")
            }
            Self::Internal(_) => Rendered::internal(),
        }
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.render().status
    }

    /// Machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.render().kind
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let rendered = self.render();

        if rendered.status == StatusCode::INTERNAL_SERVER_ERROR {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if rendered.status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %self, "Transient request failure");
        }

        let body = ErrorBody {
            error: rendered.kind,
            message: &rendered.message,
            context: rendered.context.as_ref(),
        };
        let mut response = (rendered.status, Json(body)).into_response();

        if rendered.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item to cart", Some(&[("item_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb
                .data
                .insert((*key).to_string(), Value::String((*value).to_string()));
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use ec_space_core::{Credits, ItemId};
    use testresult::TestResult;

    use super::*;
    use crate::services::checkout::StoreError;

    async fn body_json(err: AppError) -> TestResult<(StatusCode, Value)> {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("item 12".to_string());
        assert_eq!(err.to_string(), "Not found: item 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_checkout_status_codes() {
        let credits = |s: &str| s.parse::<Credits>().unwrap_or_default();
        let cases = [
            (CheckoutError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (CheckoutError::AccountNotFound, StatusCode::NOT_FOUND),
            (
                CheckoutError::InsufficientCredits {
                    balance: credits("1"),
                    required: credits("2"),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                CheckoutError::PriceMismatch {
                    claimed: credits("1"),
                    actual: credits("2"),
                },
                StatusCode::CONFLICT,
            ),
            (CheckoutError::Transient("lock".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CheckoutError::Internal("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_insufficient_stock_body_carries_context() -> TestResult {
        let err = AppError::from(CheckoutError::InsufficientStock {
            item_id: ItemId::new(7),
            name: "Warp Core".to_owned(),
            available: 1,
            requested: 2,
        });
        let (status, body) = body_json(err).await?;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "insufficient_stock");
        assert_eq!(body["item_id"], 7);
        assert_eq!(body["available"], 1);
        assert_eq!(body["requested"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_sets_retry_after() -> TestResult {
        let response = AppError::from(CheckoutError::from(StoreError::LockTimeout)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(RETRY_AFTER).map(HeaderValue::as_bytes),
            Some(&b"1"[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_internal_details_hidden() -> TestResult {
        let (status, body) = body_json(AppError::Internal("connection string leaked".into())).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal");
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_message_passes_through() -> TestResult {
        let err = AppError::from(RepositoryError::Conflict("username already taken".into()));
        let (status, body) = body_json(err).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "username already taken");
        Ok(())
    }
}
