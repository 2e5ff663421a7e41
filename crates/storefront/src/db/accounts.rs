//! Account repository for database operations.

use sqlx::PgPool;

use ec_space_core::{AccountId, AccountRole, Credits, Email, Username};

use super::{RepositoryError, unique_violation};
use crate::models::Account;

const ACCOUNT_COLUMNS: &str =
    "id, username, email, role, balance, address, created_at, updated_at";

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: Username,
    pub email: Email,
    pub role: AccountRole,
    pub balance: Credits,
}

/// Repository for account database operations.
pub struct AccountRepository<'a> {
    pool: &'a PgPool,
}

fn map_unique(err: sqlx::Error) -> RepositoryError {
    let message = unique_violation(&err).map(|constraint| match constraint {
        "account_username_key" => "username already taken",
        "account_email_key" => "email already registered",
        _ => "account already exists",
    });
    match message {
        Some(message) => RepositoryError::Conflict(message.to_owned()),
        None => RepositoryError::Database(err),
    }
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(account)
    }

    /// Get an account by username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<Account>, RepositoryError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;
        Ok(account)
    }

    /// Create an account together with its password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username or email is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        new: &NewAccount,
        password_hash: &str,
    ) -> Result<Account, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO account (username, email, role, balance)
             VALUES ($1, $2, $3, $4)
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(new.role)
        .bind(new.balance)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("INSERT INTO account_password (account_id, password_hash) VALUES ($1, $2)")
            .bind(account.id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(account)
    }

    /// Get an account and its password hash by username.
    ///
    /// Returns `None` if the account doesn't exist or has no password set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        username: &Username,
    ) -> Result<Option<(Account, String)>, RepositoryError> {
        let Some(account) = self.get_by_username(username).await? else {
            return Ok(None);
        };

        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM account_password WHERE account_id = $1")
                .bind(account.id)
                .fetch_optional(self.pool)
                .await?;

        Ok(hash.map(|hash| (account, hash)))
    }

    /// Update email and/or address. `None` fields are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account doesn't exist.
    /// Returns `RepositoryError::Conflict` if the email is taken.
    pub async fn update_profile(
        &self,
        id: AccountId,
        email: Option<&Email>,
        address: Option<&str>,
    ) -> Result<Account, RepositoryError> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE account
             SET email = COALESCE($2, email),
                 address = COALESCE($3, address),
                 updated_at = now()
             WHERE id = $1
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(email)
        .bind(address)
        .fetch_optional(self.pool)
        .await
        .map_err(map_unique)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Atomically add credits to an account and return the new balance.
    ///
    /// The increment takes the account row lock, so it serializes with any
    /// checkout of the same account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account doesn't exist.
    /// Returns `RepositoryError::Conflict` if the balance would overflow.
    pub async fn top_up(&self, id: AccountId, amount: Credits) -> Result<Credits, RepositoryError> {
        sqlx::query_scalar::<_, Credits>(
            "UPDATE account
             SET balance = balance + $2, updated_at = now()
             WHERE id = $1
             RETURNING balance",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.code().as_deref() == Some("22003")
            {
                return RepositoryError::Conflict("balance would exceed the maximum".to_owned());
            }
            RepositoryError::Database(e)
        })?
        .ok_or(RepositoryError::NotFound)
    }
}
