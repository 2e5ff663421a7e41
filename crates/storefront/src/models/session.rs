//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use ec_space_core::{AccountId, AccountRole};

/// Session-stored account identity.
///
/// Minimal data stored in the session to identify the logged-in account.
/// Balances are never cached here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Account database ID.
    pub id: AccountId,
    /// Login handle.
    pub username: String,
    /// Role at login time.
    pub role: AccountRole,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in account.
    pub const CURRENT_USER: &str = "current_user";
}
