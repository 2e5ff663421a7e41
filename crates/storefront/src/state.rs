//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::PgLedger;
use crate::services::CheckoutEngine;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Provides the configuration, the connection
/// pool, and the checkout engine bound to the `PostgreSQL` ledger.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    checkout: CheckoutEngine<PgLedger>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let ledger = PgLedger::new(pool.clone(), &config.checkout);
        let checkout = CheckoutEngine::new(ledger, config.checkout);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                checkout,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the checkout engine.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutEngine<PgLedger> {
        &self.inner.checkout
    }
}
