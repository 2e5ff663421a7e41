//! Checkout engine.
//!
//! Turns a submitted cart into a paid order in one unit of work:
//!
//! 1. lock the buyer's account row and check the balance against the
//!    submitted total
//! 2. lock every item row in ascending id order
//! 3. check stock and recompute the total from the locked prices
//! 4. debit, record the order and its lines, decrement stock
//! 5. clear the cart and commit
//!
//! Account locks are always taken before item locks and item locks are taken
//! as one ordered batch, so two checkouts can never wait on each other in a
//! cycle. Any failure drops the transaction, which rolls back every write.

mod error;
pub mod store;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ec_space_core::{AccountId, Credits, ItemId, OrderId, OrderStatus, Quantity};

pub use error::{CheckoutError, CheckoutErrorContext};
pub use store::{
    CartClear, Ledger, LedgerTx, LockedAccount, LockedItem, OrderLineDraft, StoreError,
};

use crate::config::{CartClearPolicy, CheckoutConfig};

/// One requested line as submitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckoutLine {
    pub item_id: ItemId,
    /// Raw quantity; validated by the engine.
    pub quantity: i64,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub order_id: OrderId,
    pub total: Credits,
    pub remaining_balance: Credits,
}

/// A structurally valid checkout request with duplicate items merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    claimed_total: Credits,
    lines: BTreeMap<ItemId, Quantity>,
}

impl ValidatedCheckout {
    /// Validate a raw request.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` if there are no lines, a quantity is
    /// below one, or the total is not a positive credit amount.
    pub fn new(claimed_total: Decimal, lines: &[CheckoutLine]) -> Result<Self, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::Validation(
                "order must contain at least one item".to_owned(),
            ));
        }

        let claimed_total = Credits::new(claimed_total)
            .map_err(|e| CheckoutError::Validation(format!("total: {e}")))?;
        if claimed_total.is_zero() {
            return Err(CheckoutError::Validation(
                "total must be greater than zero".to_owned(),
            ));
        }

        let mut merged: BTreeMap<ItemId, Quantity> = BTreeMap::new();
        for line in lines {
            let quantity = Quantity::try_from(line.quantity).map_err(|e| {
                CheckoutError::Validation(format!("item {}: {e}", line.item_id))
            })?;
            match merged.entry(line.item_id) {
                Entry::Vacant(slot) => {
                    slot.insert(quantity);
                }
                Entry::Occupied(mut slot) => {
                    let sum = slot.get().checked_add(quantity).ok_or_else(|| {
                        CheckoutError::Validation(format!(
                            "item {}: quantity too large",
                            line.item_id
                        ))
                    })?;
                    slot.insert(sum);
                }
            }
        }

        Ok(Self {
            claimed_total,
            lines: merged,
        })
    }

    /// Merged lines in ascending item id order.
    #[must_use]
    pub const fn lines(&self) -> &BTreeMap<ItemId, Quantity> {
        &self.lines
    }
}

/// Runs checkouts against a [`Ledger`].
#[derive(Debug, Clone)]
pub struct CheckoutEngine<L> {
    ledger: L,
    config: CheckoutConfig,
}

impl<L: Ledger> CheckoutEngine<L> {
    /// Create an engine over `ledger`.
    #[must_use]
    pub const fn new(ledger: L, config: CheckoutConfig) -> Self {
        Self { ledger, config }
    }

    /// Check out `lines` for `account_id`, paying `claimed_total`.
    ///
    /// Either every effect happens (debit, order and lines recorded, stock
    /// decremented, cart cleared) or none does.
    ///
    /// # Errors
    ///
    /// Returns a business error (`Validation`, `InsufficientCredits`,
    /// `InsufficientStock`, `PriceMismatch`, not found) when the order cannot be
    /// placed, `Transient` on lock timeouts or connection trouble, and
    /// `Internal` on unexpected storage failures.
    #[tracing::instrument(name = "checkout", skip(self, lines), fields(account_id = %account_id))]
    pub async fn checkout(
        &self,
        account_id: AccountId,
        claimed_total: Decimal,
        lines: &[CheckoutLine],
    ) -> Result<Receipt, CheckoutError> {
        let request = ValidatedCheckout::new(claimed_total, lines)?;

        let result = match tokio::time::timeout(self.config.timeout, self.run(account_id, &request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(CheckoutError::Transient("checkout timed out".to_owned())),
        };

        match &result {
            Ok(receipt) => tracing::info!(
                order_id = %receipt.order_id,
                account_id = %account_id,
                total = %receipt.total,
                remaining_balance = %receipt.remaining_balance,
                "Checkout completed"
            ),
            Err(err @ CheckoutError::Transient(_)) => {
                tracing::warn!(kind = err.kind(), error = %err, "Checkout aborted");
            }
            Err(err @ CheckoutError::Internal(_)) => {
                tracing::error!(kind = err.kind(), error = %err, "Checkout failed");
            }
            Err(err) => tracing::info!(kind = err.kind(), error = %err, "Checkout rejected"),
        }

        result
    }

    async fn run(
        &self,
        account_id: AccountId,
        request: &ValidatedCheckout,
    ) -> Result<Receipt, CheckoutError> {
        let mut tx = self.ledger.begin().await?;

        let account = tx
            .lock_account(account_id)
            .await?
            .ok_or(CheckoutError::AccountNotFound)?;
        if account.balance < request.claimed_total {
            return Err(CheckoutError::InsufficientCredits {
                balance: account.balance,
                required: request.claimed_total,
            });
        }

        let ids: Vec<ItemId> = request.lines.keys().copied().collect();
        let locked: HashMap<ItemId, LockedItem> = tx
            .lock_items(&ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let drafts = price_lines(&request.lines, &locked)?;
        let total = order_total(&drafts)?;
        if total != request.claimed_total {
            return Err(CheckoutError::PriceMismatch {
                claimed: request.claimed_total,
                actual: total,
            });
        }

        let remaining_balance = tx.debit(account_id, total).await?;
        let order_id = tx.create_order(account_id, total, OrderStatus::Paid).await?;
        for draft in &drafts {
            tx.add_order_line(order_id, draft).await?;
            tx.decrement_stock(draft.item_id, draft.quantity).await?;
        }

        let which = match self.config.cart_clear {
            CartClearPolicy::Whole => CartClear::All,
            CartClearPolicy::Submitted => CartClear::Items(&ids),
        };
        tx.clear_cart(account_id, which).await?;
        tx.commit().await?;

        Ok(Receipt {
            order_id,
            total,
            remaining_balance,
        })
    }
}

/// Check stock for every line and attach the locked unit price.
fn price_lines(
    lines: &BTreeMap<ItemId, Quantity>,
    locked: &HashMap<ItemId, LockedItem>,
) -> Result<Vec<OrderLineDraft>, CheckoutError> {
    lines
        .iter()
        .map(|(&item_id, &quantity)| {
            let item = locked
                .get(&item_id)
                .ok_or(CheckoutError::ItemNotFound { item_id })?;
            if item.stock_count < quantity.get() {
                return Err(CheckoutError::InsufficientStock {
                    item_id,
                    name: item.name.clone(),
                    available: item.stock_count,
                    requested: quantity.get(),
                });
            }
            Ok(OrderLineDraft {
                item_id,
                quantity,
                unit_price: item.unit_price,
            })
        })
        .collect()
}

fn order_total(drafts: &[OrderLineDraft]) -> Result<Credits, CheckoutError> {
    drafts.iter().try_fold(Credits::ZERO, |acc, line| {
        line.unit_price
            .checked_mul(line.quantity)
            .and_then(|line_total| acc.checked_add(line_total))
            .ok_or_else(|| CheckoutError::Validation("order total is too large".to_owned()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;

    use super::*;
    use crate::db::memory::{FaultKind, FaultPoint, MemoryStore};
    use crate::services::cart::{CartStore, CartUpdate};

    fn credits(s: &str) -> Credits {
        s.parse().unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(item_id: ItemId, quantity: i64) -> CheckoutLine {
        CheckoutLine { item_id, quantity }
    }

    fn engine(store: &MemoryStore) -> CheckoutEngine<MemoryStore> {
        CheckoutEngine::new(store.clone(), CheckoutConfig::default())
    }

    #[test]
    fn test_validation_rejects_empty_and_bad_quantities() {
        assert!(matches!(
            ValidatedCheckout::new(dec("10"), &[]),
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            ValidatedCheckout::new(dec("10"), &[line(ItemId::new(1), 0)]),
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            ValidatedCheckout::new(dec("10"), &[line(ItemId::new(1), -2)]),
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            ValidatedCheckout::new(dec("0"), &[line(ItemId::new(1), 1)]),
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            ValidatedCheckout::new(dec("-5"), &[line(ItemId::new(1), 1)]),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_merges_duplicate_items() {
        let request = ValidatedCheckout::new(
            dec("30"),
            &[
                line(ItemId::new(9), 1),
                line(ItemId::new(2), 1),
                line(ItemId::new(9), 2),
            ],
        )
        .unwrap();
        let merged: Vec<(ItemId, i32)> = request
            .lines()
            .iter()
            .map(|(id, q)| (*id, q.get()))
            .collect();
        assert_eq!(merged, vec![(ItemId::new(2), 1), (ItemId::new(9), 3)]);
    }

    #[tokio::test]
    async fn test_successful_checkout_moves_credits_and_stock() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("100.00"));
        let blaster = store.add_item("Laser Blaster", credits("50.00"), 5);
        store
            .upsert(account, blaster, CartUpdate::Set(2))
            .await?;

        let receipt = engine(&store)
            .checkout(account, dec("100.00"), &[line(blaster, 2)])
            .await?;

        assert_eq!(receipt.total, credits("100"));
        assert!(receipt.remaining_balance.is_zero());
        assert_eq!(store.balance(account).await, Some(Credits::ZERO));
        assert_eq!(store.stock(blaster).await, Some(3));
        assert!(store.lines(account).await?.is_empty());

        let orders = store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Paid);
        assert_eq!(orders[0].lines[0].unit_price, credits("50.00"));
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_credits_reports_balance_and_required() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("40.00"));
        let blaster = store.add_item("Laser Blaster", credits("50.00"), 5);

        let err = engine(&store)
            .checkout(account, dec("50.00"), &[line(blaster, 1)])
            .await
            .unwrap_err();

        match err {
            CheckoutError::InsufficientCredits { balance, required } => {
                assert_eq!(balance, credits("40"));
                assert_eq!(required, credits("50"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.stock(blaster).await, Some(5));
        assert!(store.orders().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_the_item() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("1000.00"));
        let cannon = store.add_item("Ion Cannon", credits("100.00"), 1);

        let err = engine(&store)
            .checkout(account, dec("300.00"), &[line(cannon, 3)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { available: 1, requested: 3, ref name, .. } if name == "Ion Cannon"
        ));
        assert_eq!(store.balance(account).await, Some(credits("1000.00")));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("1000.00"));

        let err = engine(&store)
            .checkout(account, dec("10.00"), &[line(ItemId::new(404), 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::ItemNotFound { item_id } if item_id == ItemId::new(404)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let item = store.add_item("Shield Cell", credits("5.00"), 1);

        let err = engine(&store)
            .checkout(AccountId::new(77), dec("5.00"), &[line(item, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AccountNotFound));
    }

    #[tokio::test]
    async fn test_stale_total_is_a_price_mismatch() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("1000.00"));
        let blaster = store.add_item("Laser Blaster", credits("55.00"), 5);

        let err = engine(&store)
            .checkout(account, dec("50.00"), &[line(blaster, 1)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::PriceMismatch { claimed, actual }
                if claimed == credits("50") && actual == credits("55")
        ));
        assert_eq!(store.balance(account).await, Some(credits("1000.00")));
        Ok(())
    }

    #[tokio::test]
    async fn test_submitted_policy_keeps_other_cart_lines() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("100.00"));
        let bought = store.add_item("Laser Blaster", credits("50.00"), 5);
        let kept = store.add_item("Ion Cannon", credits("500.00"), 1);
        store.upsert(account, bought, CartUpdate::Set(1)).await?;
        store.upsert(account, kept, CartUpdate::Set(1)).await?;

        let config = CheckoutConfig {
            cart_clear: CartClearPolicy::Submitted,
            ..CheckoutConfig::default()
        };
        CheckoutEngine::new(store.clone(), config)
            .checkout(account, dec("50.00"), &[line(bought, 1)])
            .await?;

        let remaining: Vec<ItemId> = store
            .lines(account)
            .await?
            .into_iter()
            .map(|l| l.item_id)
            .collect();
        assert_eq!(remaining, vec![kept]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fault_after_order_header_rolls_everything_back() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("100.00"));
        let blaster = store.add_item("Laser Blaster", credits("50.00"), 5);
        store.upsert(account, blaster, CartUpdate::Set(2)).await?;
        store.inject_fault(FaultPoint::AfterOrderHeader, FaultKind::Fatal);

        let err = engine(&store)
            .checkout(account, dec("100.00"), &[line(blaster, 2)])
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Internal(_)));
        assert_eq!(store.balance(account).await, Some(credits("100.00")));
        assert_eq!(store.stock(blaster).await, Some(5));
        assert!(store.orders().is_empty());
        assert_eq!(store.lines(account).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_lock_timeout_is_transient() -> TestResult {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let account = store.add_account(credits("100.00"));
        let blaster = store.add_item("Laser Blaster", credits("50.00"), 5);

        let mut holder = store.begin().await?;
        holder.lock_account(account).await?;

        let err = engine(&store)
            .checkout(account, dec("50.00"), &[line(blaster, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Transient(_)));

        drop(holder);
        let receipt = engine(&store)
            .checkout(account, dec("50.00"), &[line(blaster, 1)])
            .await?;
        assert_eq!(receipt.remaining_balance, credits("50.00"));
        Ok(())
    }

    #[tokio::test]
    async fn test_deadline_expiry_rolls_back() -> TestResult {
        let store = MemoryStore::with_lock_timeout(Duration::from_secs(10));
        let account = store.add_account(credits("100.00"));
        let blaster = store.add_item("Laser Blaster", credits("50.00"), 5);
        store.upsert(account, blaster, CartUpdate::Add(1)).await?;

        let mut holder = store.begin().await?;
        holder.lock_items(&[blaster]).await?;

        let config = CheckoutConfig {
            timeout: Duration::from_millis(100),
            ..CheckoutConfig::default()
        };
        let err = CheckoutEngine::new(store.clone(), config)
            .checkout(account, dec("50.00"), &[line(blaster, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Transient(_)));
        drop(holder);

        assert_eq!(store.balance(account).await, Some(credits("100.00")));
        assert_eq!(store.stock(blaster).await, Some(5));
        assert_eq!(store.lines(account).await?.len(), 1);
        assert!(store.orders().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_checked_against_stock_together() -> TestResult {
        let store = MemoryStore::new();
        let account = store.add_account(credits("100.00"));
        let cell = store.add_item("Shield Cell", credits("5.00"), 3);

        let err = engine(&store)
            .checkout(account, dec("20.00"), &[line(cell, 2), line(cell, 2)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            }
        ));
        assert_eq!(store.stock(cell).await, Some(3));

        let receipt = engine(&store)
            .checkout(account, dec("15.00"), &[line(cell, 1), line(cell, 2)])
            .await?;
        assert_eq!(receipt.total, credits("15.00"));
        assert_eq!(store.stock(cell).await, Some(0));
        Ok(())
    }
}
