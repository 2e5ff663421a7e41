//! Account management commands.
//!
//! Administrators cannot sign up through the API; they are created here.

use ec_space_core::{AccountRole, Credits, Username};
use ec_space_storefront::db::AccountRepository;
use ec_space_storefront::services::AuthService;
use rust_decimal::Decimal;

use super::CliError;

/// Create an administrator account with a zero balance.
///
/// # Errors
///
/// Returns an error if the input is invalid, the username or email is taken,
/// or the database is unreachable.
pub async fn create_admin(username: &str, email: &str, password: &str) -> Result<(), CliError> {
    let pool = super::connect().await?;

    tracing::info!("Creating admin account: {username}");
    let account = AuthService::new(&pool)
        .register(username, email, password, AccountRole::Admin, Credits::ZERO)
        .await?;

    tracing::info!(
        "Admin account created successfully! ID: {}, Username: {}",
        account.id,
        account.username
    );
    Ok(())
}

/// Credit an account.
///
/// # Errors
///
/// Returns an error if the amount is not a positive credit amount, the
/// account does not exist, or the database is unreachable.
pub async fn top_up(username: &str, amount: Decimal) -> Result<(), CliError> {
    let username = Username::parse(username).map_err(|e| CliError::Invalid(e.to_string()))?;
    let amount = Credits::new(amount).map_err(|e| CliError::Invalid(e.to_string()))?;
    if amount.is_zero() {
        return Err(CliError::Invalid("amount must be greater than zero".to_owned()));
    }

    let pool = super::connect().await?;
    let accounts = AccountRepository::new(&pool);

    let account = accounts
        .get_by_username(&username)
        .await?
        .ok_or_else(|| CliError::Invalid(format!("no account named {username}")))?;
    let balance = accounts.top_up(account.id, amount).await?;

    tracing::info!("Credited {amount} to {username}; new balance {balance}");
    Ok(())
}
