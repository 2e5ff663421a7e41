//! In-process ledger and cart store.
//!
//! Mirrors the locking behaviour of the `PostgreSQL` ledger: every account and
//! item row sits behind its own async mutex, a transaction holds the guards it
//! acquired until commit or drop, and writes are staged in the transaction and
//! applied only on commit. Lock waits are bounded by a timeout.
//!
//! Used by the checkout tests, including fault injection at fixed points of
//! the protocol.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use ec_space_core::{AccountId, Credits, ItemId, OrderId, OrderStatus, Quantity};

use crate::models::CartLine;
use crate::services::cart::{CartStore, CartUpdate, resolve_quantity};
use crate::services::checkout::{
    CartClear, Ledger, LedgerTx, LockedAccount, LockedItem, OrderLineDraft, StoreError,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Right after the order header is written.
    AfterOrderHeader,
    /// When the transaction commits, before anything is applied.
    Commit,
}

/// What an injected fault looks like to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A retryable failure such as a dropped connection.
    Transient,
    /// A non-retryable failure.
    Fatal,
}

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryOrder {
    pub id: OrderId,
    pub account_id: AccountId,
    pub total: Credits,
    pub status: OrderStatus,
    pub lines: Vec<OrderLineDraft>,
}

#[derive(Debug)]
struct AccountRow {
    balance: Credits,
}

#[derive(Debug)]
struct ItemRow {
    name: String,
    unit_price: Credits,
    stock_count: i32,
}

type Carts = HashMap<AccountId, BTreeMap<ItemId, Quantity>>;

#[derive(Debug)]
struct Inner {
    lock_timeout: Duration,
    accounts: RwLock<BTreeMap<AccountId, Arc<RowLock<AccountRow>>>>,
    items: RwLock<BTreeMap<ItemId, Arc<RowLock<ItemRow>>>>,
    carts: Mutex<Carts>,
    orders: Mutex<Vec<MemoryOrder>>,
    faults: Mutex<Vec<(FaultPoint, FaultKind)>>,
    next_account: AtomicI32,
    next_item: AtomicI32,
    next_order: AtomicI32,
}

/// In-memory implementation of [`Ledger`] and [`CartStore`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose lock waits give up after `lock_timeout`.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                lock_timeout,
                accounts: RwLock::default(),
                items: RwLock::default(),
                carts: Mutex::default(),
                orders: Mutex::default(),
                faults: Mutex::default(),
                next_account: AtomicI32::new(1),
                next_item: AtomicI32::new(1),
                next_order: AtomicI32::new(1),
            }),
        }
    }

    /// Add an account with the given balance.
    pub fn add_account(&self, balance: Credits) -> AccountId {
        let id = AccountId::new(self.inner.next_account.fetch_add(1, Ordering::Relaxed));
        self.inner
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(RowLock::new(AccountRow { balance })));
        id
    }

    /// Add a catalog item.
    pub fn add_item(&self, name: &str, unit_price: Credits, stock_count: i32) -> ItemId {
        let id = ItemId::new(self.inner.next_item.fetch_add(1, Ordering::Relaxed));
        self.inner
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Arc::new(RowLock::new(ItemRow {
                    name: name.to_owned(),
                    unit_price,
                    stock_count,
                })),
            );
        id
    }

    /// Change an item's price, waiting for any transaction holding the row.
    pub async fn set_price(&self, item: ItemId, unit_price: Credits) -> bool {
        let Some(row) = self.item_row(item) else {
            return false;
        };
        row.lock().await.unit_price = unit_price;
        true
    }

    /// Committed balance of an account.
    pub async fn balance(&self, account: AccountId) -> Option<Credits> {
        let row = self.account_row(account)?;
        let balance = row.lock().await.balance;
        Some(balance)
    }

    /// Committed stock of an item.
    pub async fn stock(&self, item: ItemId) -> Option<i32> {
        let row = self.item_row(item)?;
        let stock = row.lock().await.stock_count;
        Some(stock)
    }

    /// All committed orders in commit order.
    #[must_use]
    pub fn orders(&self) -> Vec<MemoryOrder> {
        self.inner
            .orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Arrange for the next transaction reaching `point` to fail. One-shot.
    pub fn inject_fault(&self, point: FaultPoint, kind: FaultKind) {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((point, kind));
    }

    fn account_row(&self, id: AccountId) -> Option<Arc<RowLock<AccountRow>>> {
        self.inner
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn item_row(&self, id: ItemId) -> Option<Arc<RowLock<ItemRow>>> {
        self.inner
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn carts(&self) -> std::sync::MutexGuard<'_, Carts> {
        self.inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn take_fault(&self, point: FaultPoint) -> Option<StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let index = faults.iter().position(|(p, _)| *p == point)?;
        let (_, kind) = faults.remove(index);
        Some(match kind {
            FaultKind::Transient => StoreError::Unavailable(format!("injected fault at {point:?}")),
            FaultKind::Fatal => StoreError::Fatal(format!("injected fault at {point:?}")),
        })
    }
}

async fn lock_row<T>(row: Arc<RowLock<T>>, timeout: Duration) -> Result<OwnedMutexGuard<T>, StoreError> {
    tokio::time::timeout(timeout, row.lock_owned())
        .await
        .map_err(|_| StoreError::LockTimeout)
}

/// A unit of work against a [`MemoryStore`].
pub struct MemoryTx {
    store: MemoryStore,
    accounts: BTreeMap<AccountId, OwnedMutexGuard<AccountRow>>,
    items: BTreeMap<ItemId, OwnedMutexGuard<ItemRow>>,
    balances: BTreeMap<AccountId, Credits>,
    stock: BTreeMap<ItemId, i32>,
    orders: Vec<MemoryOrder>,
    cart_clears: Vec<(AccountId, Option<Vec<ItemId>>)>,
}

impl MemoryTx {
    fn balance_of(&self, id: AccountId) -> Option<Credits> {
        self.balances
            .get(&id)
            .copied()
            .or_else(|| self.accounts.get(&id).map(|row| row.balance))
    }

    fn stock_of(&self, id: ItemId) -> Option<i32> {
        self.stock
            .get(&id)
            .copied()
            .or_else(|| self.items.get(&id).map(|row| row.stock_count))
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            store: self.clone(),
            accounts: BTreeMap::new(),
            items: BTreeMap::new(),
            balances: BTreeMap::new(),
            stock: BTreeMap::new(),
            orders: Vec::new(),
            cart_clears: Vec::new(),
        })
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<LockedAccount>, StoreError> {
        if !self.accounts.contains_key(&id) {
            let Some(row) = self.store.account_row(id) else {
                return Ok(None);
            };
            let guard = lock_row(row, self.store.inner.lock_timeout).await?;
            self.accounts.insert(id, guard);
        }
        Ok(self
            .balance_of(id)
            .map(|balance| LockedAccount { id, balance }))
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<LockedItem>, StoreError> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut locked = Vec::with_capacity(ordered.len());
        for id in ordered {
            if !self.items.contains_key(&id) {
                let Some(row) = self.store.item_row(id) else {
                    continue;
                };
                let guard = lock_row(row, self.store.inner.lock_timeout).await?;
                self.items.insert(id, guard);
            }
            if let (Some(row), Some(stock_count)) = (self.items.get(&id), self.stock_of(id)) {
                locked.push(LockedItem {
                    id,
                    name: row.name.clone(),
                    unit_price: row.unit_price,
                    stock_count,
                });
            }
        }
        Ok(locked)
    }

    async fn debit(&mut self, id: AccountId, amount: Credits) -> Result<Credits, StoreError> {
        let remaining = self
            .balance_of(id)
            .and_then(|balance| balance.checked_sub(amount))
            .ok_or_else(|| {
                StoreError::Invariant(format!("debit of {amount} from account {id} matched no row"))
            })?;
        self.balances.insert(id, remaining);
        Ok(remaining)
    }

    async fn create_order(
        &mut self,
        account: AccountId,
        total: Credits,
        status: OrderStatus,
    ) -> Result<OrderId, StoreError> {
        let id = OrderId::new(self.store.inner.next_order.fetch_add(1, Ordering::Relaxed));
        self.orders.push(MemoryOrder {
            id,
            account_id: account,
            total,
            status,
            lines: Vec::new(),
        });
        if let Some(fault) = self.store.inner.take_fault(FaultPoint::AfterOrderHeader) {
            return Err(fault);
        }
        Ok(id)
    }

    async fn add_order_line(
        &mut self,
        order: OrderId,
        line: &OrderLineDraft,
    ) -> Result<(), StoreError> {
        let staged = self
            .orders
            .iter_mut()
            .find(|o| o.id == order)
            .ok_or_else(|| StoreError::Invariant(format!("order {order} not created in this transaction")))?;
        staged.lines.push(*line);
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        item: ItemId,
        quantity: Quantity,
    ) -> Result<(), StoreError> {
        let remaining = self
            .stock_of(item)
            .map(|stock| stock - quantity.get())
            .filter(|remaining| *remaining >= 0)
            .ok_or_else(|| {
                StoreError::Invariant(format!(
                    "stock decrement of {quantity} for item {item} matched no row"
                ))
            })?;
        self.stock.insert(item, remaining);
        Ok(())
    }

    async fn clear_cart(
        &mut self,
        account: AccountId,
        which: CartClear<'_>,
    ) -> Result<(), StoreError> {
        let items = match which {
            CartClear::All => None,
            CartClear::Items(items) => Some(items.to_vec()),
        };
        self.cart_clears.push((account, items));
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if let Some(fault) = self.store.inner.take_fault(FaultPoint::Commit) {
            return Err(fault);
        }

        for (id, balance) in &self.balances {
            if let Some(row) = self.accounts.get_mut(id) {
                row.balance = *balance;
            }
        }
        for (id, stock) in &self.stock {
            if let Some(row) = self.items.get_mut(id) {
                row.stock_count = *stock;
            }
        }

        {
            let mut carts = self.store.carts();
            for (account, items) in &self.cart_clears {
                match items {
                    None => {
                        carts.remove(account);
                    }
                    Some(items) => {
                        if let Some(cart) = carts.get_mut(account) {
                            cart.retain(|item, _| !items.contains(item));
                        }
                    }
                }
            }
        }

        self.store
            .inner
            .orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&mut self.orders);

        Ok(())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn lines(&self, account: AccountId) -> Result<Vec<CartLine>, StoreError> {
        let entries: Vec<(ItemId, Quantity)> = self
            .carts()
            .get(&account)
            .map(|cart| cart.iter().map(|(id, q)| (*id, *q)).collect())
            .unwrap_or_default();

        let mut lines = Vec::with_capacity(entries.len());
        for (item_id, quantity) in entries {
            let Some(row) = self.item_row(item_id) else {
                continue;
            };
            let row = row.lock().await;
            lines.push(CartLine {
                item_id,
                name: row.name.clone(),
                unit_price: row.unit_price,
                quantity,
                available: row.stock_count,
            });
        }
        Ok(lines)
    }

    async fn quantity(
        &self,
        account: AccountId,
        item: ItemId,
    ) -> Result<Option<Quantity>, StoreError> {
        Ok(self
            .carts()
            .get(&account)
            .and_then(|cart| cart.get(&item).copied()))
    }

    async fn upsert(
        &self,
        account: AccountId,
        item: ItemId,
        update: CartUpdate,
    ) -> Result<Option<Quantity>, StoreError> {
        let mut carts = self.carts();
        let cart = carts.entry(account).or_default();
        let next = resolve_quantity(cart.get(&item).copied(), update);
        match next {
            Some(quantity) => {
                cart.insert(item, quantity);
            }
            None => {
                cart.remove(&item);
            }
        }
        Ok(next)
    }

    async fn remove(&self, account: AccountId, item: ItemId) -> Result<bool, StoreError> {
        Ok(self
            .carts()
            .get_mut(&account)
            .is_some_and(|cart| cart.remove(&item).is_some()))
    }

    async fn clear(&self, account: AccountId) -> Result<u64, StoreError> {
        let removed = self.carts().remove(&account).map_or(0, |cart| cart.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
