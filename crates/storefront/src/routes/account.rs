//! Profile and credit top-up handlers.

use axum::{Json, extract::State};
use ec_space_core::{Credits, Email};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ApiJson;
use crate::db::AccountRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Profile;
use crate::state::AppState;

/// Longest accepted shipping address.
const MAX_ADDRESS_LENGTH: usize = 500;

/// Profile update body. At least one field is required.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Top-up request body.
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: Decimal,
}

/// Top-up response body.
#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub balance: Credits,
}

/// The logged-in account's profile.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Profile>> {
    let account = AccountRepository::new(state.pool())
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("account".to_owned()))?;
    Ok(Json(Profile::from(account)))
}

/// Validated form of a [`ProfileUpdate`].
fn parse_update(update: &ProfileUpdate) -> Result<(Option<Email>, Option<String>)> {
    if update.email.is_none() && update.address.is_none() {
        return Err(AppError::BadRequest(
            "provide at least one of email or address".to_owned(),
        ));
    }

    let email = update
        .email
        .as_deref()
        .map(Email::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let address = update.address.as_deref().map(str::trim).map(String::from);
    if let Some(address) = &address
        && address.chars().count() > MAX_ADDRESS_LENGTH
    {
        return Err(AppError::BadRequest(format!(
            "address cannot exceed {MAX_ADDRESS_LENGTH} characters"
        )));
    }

    Ok((email, address))
}

/// Update email and/or address.
#[instrument(skip(state, user, body), fields(account_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let (email, address) = parse_update(&body)?;

    let account = AccountRepository::new(state.pool())
        .update_profile(user.id, email.as_ref(), address.as_deref())
        .await?;
    Ok(Json(Profile::from(account)))
}

/// Check a top-up amount against the per-request maximum.
fn parse_amount(amount: Decimal, max: Credits) -> Result<Credits> {
    let amount = Credits::new(amount).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if amount.is_zero() {
        return Err(AppError::BadRequest(
            "amount must be greater than zero".to_owned(),
        ));
    }
    if amount > max {
        return Err(AppError::BadRequest(format!(
            "amount cannot exceed {max} per top-up"
        )));
    }
    Ok(amount)
}

/// Add credits to the logged-in account.
#[instrument(skip(state, user, body), fields(account_id = %user.id))]
pub async fn top_up(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<TopUpRequest>,
) -> Result<Json<TopUpResponse>> {
    let amount = parse_amount(body.amount, state.config().max_topup)?;

    let balance = AccountRepository::new(state.pool())
        .top_up(user.id, amount)
        .await?;

    tracing::info!(%amount, %balance, "Credits topped up");
    Ok(Json(TopUpResponse { balance }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max() -> Credits {
        Credits::from_cents(100_000).unwrap_or_default()
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(parse_amount(Decimal::ZERO, max()).is_err());
        assert!(parse_amount(Decimal::new(-5, 0), max()).is_err());
    }

    #[test]
    fn test_amount_capped() {
        assert!(parse_amount(Decimal::new(1000, 0), max()).is_ok());
        assert!(parse_amount(Decimal::new(100_001, 2), max()).is_err());
    }

    #[test]
    fn test_amount_precision() {
        assert!(parse_amount(Decimal::new(1001, 3), max()).is_err());
    }

    #[test]
    fn test_empty_profile_update_rejected() {
        assert!(parse_update(&ProfileUpdate::default()).is_err());
    }

    #[test]
    fn test_profile_update_validates_email() {
        let update = ProfileUpdate {
            email: Some("not-an-email".to_owned()),
            address: None,
        };
        assert!(parse_update(&update).is_err());

        let update = ProfileUpdate {
            email: None,
            address: Some("  Dock 7, Orbital Ring  ".to_owned()),
        };
        let parsed = parse_update(&update).ok();
        assert_eq!(
            parsed.and_then(|(_, address)| address),
            Some("Dock 7, Orbital Ring".to_owned())
        );
    }
}
