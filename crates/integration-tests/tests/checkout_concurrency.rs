//! Checkout under concurrency, against the in-process ledger.
//!
//! These run without external services. Every test uses the multi-threaded
//! runtime so checkouts really do race for row locks.

use std::time::Duration;

use ec_space_core::{Credits, ItemId};
use ec_space_storefront::config::{CartClearPolicy, CheckoutConfig};
use ec_space_storefront::db::MemoryStore;
use ec_space_storefront::db::memory::{FaultKind, FaultPoint};
use ec_space_storefront::services::{
    CartStore, CartUpdate, CheckoutEngine, CheckoutError, CheckoutLine, Receipt,
};
use rust_decimal::Decimal;
use testresult::TestResult;
use tokio::task::JoinSet;

fn credits(s: &str) -> Credits {
    s.parse().unwrap_or_default()
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

fn engine(store: &MemoryStore) -> CheckoutEngine<MemoryStore> {
    CheckoutEngine::new(store.clone(), CheckoutConfig::default())
}

fn line(item_id: ItemId, quantity: i64) -> CheckoutLine {
    CheckoutLine { item_id, quantity }
}

async fn join_all(
    mut set: JoinSet<Result<Receipt, CheckoutError>>,
) -> TestResult<Vec<Result<Receipt, CheckoutError>>> {
    let mut results = Vec::new();
    while let Some(result) = set.join_next().await {
        results.push(result?);
    }
    Ok(results)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_units_are_never_oversold() -> TestResult {
    let store = MemoryStore::new();
    let item = store.add_item("Warp Coil", credits("10.00"), 5);
    let buyers: Vec<_> = (0..20).map(|_| store.add_account(credits("100.00"))).collect();

    let engine = engine(&store);
    let mut set = JoinSet::new();
    for buyer in buyers.clone() {
        let engine = engine.clone();
        set.spawn(async move { engine.checkout(buyer, dec("10.00"), &[line(item, 1)]).await });
    }
    let results = join_all(set).await?;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 5);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CheckoutError::InsufficientStock { available: 0, .. }))
    );
    assert_eq!(store.stock(item).await, Some(0));
    assert_eq!(store.orders().len(), 5);

    let mut spent = Credits::ZERO;
    for buyer in buyers {
        let balance = store.balance(buyer).await.unwrap_or_default();
        spent = spent
            .checked_add(credits("100.00").checked_sub(balance).unwrap_or_default())
            .unwrap_or_default();
    }
    assert_eq!(spent, credits("50.00"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_balance_is_never_overdrawn() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Shield Cell", credits("30.00"), 100);

    let engine = engine(&store);
    let mut set = JoinSet::new();
    for _ in 0..10 {
        let engine = engine.clone();
        set.spawn(async move { engine.checkout(buyer, dec("30.00"), &[line(item, 1)]).await });
    }
    let results = join_all(set).await?;

    // floor(100 / 30) = 3
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CheckoutError::InsufficientCredits { .. }))
    );
    assert_eq!(store.balance(buyer).await, Some(credits("10.00")));
    assert_eq!(store.stock(item).await, Some(97));

    let mut remaining: Vec<Credits> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|receipt| receipt.remaining_balance))
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![credits("10.00"), credits("40.00"), credits("70.00")]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_item_orders_do_not_deadlock() -> TestResult {
    let store = MemoryStore::with_lock_timeout(Duration::from_secs(2));
    let a = store.add_item("Hull Plate", credits("1.00"), 1_000);
    let b = store.add_item("Rivet Pack", credits("1.00"), 1_000);

    let engine = engine(&store);
    let mut set = JoinSet::new();
    for i in 0..40 {
        let buyer = store.add_account(credits("100.00"));
        let engine = engine.clone();
        let lines = if i % 2 == 0 {
            vec![line(a, 1), line(b, 1)]
        } else {
            vec![line(b, 1), line(a, 1)]
        };
        set.spawn(async move { engine.checkout(buyer, dec("2.00"), &lines).await });
    }
    let results = join_all(set).await?;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(store.stock(a).await, Some(960));
    assert_eq!(store.stock(b).await, Some(960));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fault_after_order_header_leaves_no_trace() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Nav Beacon", credits("25.00"), 3);
    store.upsert(buyer, item, CartUpdate::Add(2)).await?;

    store.inject_fault(FaultPoint::AfterOrderHeader, FaultKind::Fatal);
    let result = engine(&store)
        .checkout(buyer, dec("50.00"), &[line(item, 2)])
        .await;

    assert!(matches!(result, Err(CheckoutError::Internal(_))));
    assert_eq!(store.balance(buyer).await, Some(credits("100.00")));
    assert_eq!(store.stock(item).await, Some(3));
    assert!(store.orders().is_empty());
    assert_eq!(store.lines(buyer).await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retry_after_transient_commit_failure_places_one_order() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Fuel Rod", credits("40.00"), 2);

    store.inject_fault(FaultPoint::Commit, FaultKind::Transient);
    let engine = engine(&store);
    let lines = [line(item, 2)];

    let first = engine.checkout(buyer, dec("80.00"), &lines).await;
    assert!(matches!(first, Err(CheckoutError::Transient(_))));
    assert_eq!(store.balance(buyer).await, Some(credits("100.00")));
    assert_eq!(store.stock(item).await, Some(2));

    let receipt = engine.checkout(buyer, dec("80.00"), &lines).await?;
    assert_eq!(receipt.remaining_balance, credits("20.00"));
    assert_eq!(store.stock(item).await, Some(0));
    assert_eq!(store.orders().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cart_cleared_only_on_success() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Med Kit", credits("20.00"), 1);
    store.upsert(buyer, item, CartUpdate::Add(2)).await?;

    let engine = engine(&store);
    let rejected = engine
        .checkout(buyer, dec("40.00"), &[line(item, 2)])
        .await;
    assert!(matches!(rejected, Err(CheckoutError::InsufficientStock { .. })));
    assert_eq!(store.lines(buyer).await?.len(), 1);

    store.upsert(buyer, item, CartUpdate::Set(1)).await?;
    engine.checkout(buyer, dec("20.00"), &[line(item, 1)]).await?;
    assert!(store.lines(buyer).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submitted_policy_keeps_other_lines() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let bought = store.add_item("Star Chart", credits("5.00"), 10);
    let kept = store.add_item("Sextant", credits("8.00"), 10);
    store.upsert(buyer, bought, CartUpdate::Add(1)).await?;
    store.upsert(buyer, kept, CartUpdate::Add(3)).await?;

    let config = CheckoutConfig {
        cart_clear: CartClearPolicy::Submitted,
        ..CheckoutConfig::default()
    };
    CheckoutEngine::new(store.clone(), config)
        .checkout(buyer, dec("5.00"), &[line(bought, 1)])
        .await?;

    let lines = store.lines(buyer).await?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines.first().map(|l| l.item_id), Some(kept));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exact_balance_purchase_empties_account_and_stock() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Cargo Pod", credits("50.00"), 2);

    let receipt = engine(&store)
        .checkout(buyer, dec("100.00"), &[line(item, 2)])
        .await?;

    assert_eq!(receipt.total, credits("100.00"));
    assert_eq!(receipt.remaining_balance, Credits::ZERO);
    assert_eq!(store.balance(buyer).await, Some(Credits::ZERO));
    assert_eq!(store.stock(item).await, Some(0));

    let orders = store.orders();
    assert_eq!(orders.len(), 1);
    let order = orders.first().ok_or("no order")?;
    assert_eq!(order.lines.len(), 1);
    let order_line = order.lines.first().ok_or("no line")?;
    assert_eq!(order_line.item_id, item);
    assert_eq!(order_line.quantity.get(), 2);
    assert_eq!(order_line.unit_price, credits("50.00"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_short_stock_changes_nothing() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Cargo Pod", credits("50.00"), 1);

    let result = engine(&store)
        .checkout(buyer, dec("100.00"), &[line(item, 2)])
        .await;

    assert!(matches!(
        result,
        Err(CheckoutError::InsufficientStock {
            available: 1,
            requested: 2,
            ..
        })
    ));
    assert_eq!(store.balance(buyer).await, Some(credits("100.00")));
    assert_eq!(store.stock(item).await, Some(1));
    assert!(store.orders().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_price_change_during_checkout_is_detected() -> TestResult {
    let store = MemoryStore::new();
    let buyer = store.add_account(credits("100.00"));
    let item = store.add_item("Tractor Beam", credits("30.00"), 5);

    assert!(store.set_price(item, credits("35.00")).await);
    let result = engine(&store)
        .checkout(buyer, dec("30.00"), &[line(item, 1)])
        .await;

    assert!(matches!(result, Err(CheckoutError::PriceMismatch { .. })));
    assert_eq!(store.balance(buyer).await, Some(credits("100.00")));
    Ok(())
}
