//! Account domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ec_space_core::{AccountId, AccountRole, Credits, Email, Username};

/// A customer or administrator account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub username: Username,
    pub email: Email,
    pub role: AccountRole,
    /// Spendable credits. Mutated only by top-up and checkout.
    pub balance: Credits,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of an account, returned by the profile endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: AccountId,
    pub username: Username,
    pub email: Email,
    pub role: AccountRole,
    pub credits: Credits,
    pub address: Option<String>,
}

impl From<Account> for Profile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            role: account.role,
            credits: account.balance,
            address: account.address,
        }
    }
}
