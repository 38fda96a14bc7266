use crate::domain::model::{Order, OrderId, OrderItem, OrderItemId, ProductId, ProductStock};
use crate::domain::port::{CheckoutStore, CheckoutTransaction, RepositoryError, StockDecrement};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// ストア操作の種類
/// 障害注入で失敗させる操作の指定に使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Begin,
    FetchExistingOrderIds,
    FetchExistingItemIds,
    FetchStock,
    DecrementStock,
    InsertOrders,
    InsertOrderItems,
    FetchOrders,
    Commit,
}

impl StoreOperation {
    /// バッチ処理が呼び出しうる全操作（呼び出し順）
    pub const ALL: [StoreOperation; 9] = [
        StoreOperation::Begin,
        StoreOperation::FetchExistingOrderIds,
        StoreOperation::FetchExistingItemIds,
        StoreOperation::FetchStock,
        StoreOperation::DecrementStock,
        StoreOperation::InsertOrders,
        StoreOperation::InsertOrderItems,
        StoreOperation::FetchOrders,
        StoreOperation::Commit,
    ];
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    stock: HashMap<ProductId, u32>,
    orders: HashMap<OrderId, Order>,
    items: Vec<OrderItem>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<StoreState>,
    failures: Mutex<HashSet<StoreOperation>>,
    decrement_log: Mutex<Vec<Vec<StockDecrement>>>,
    begun: AtomicUsize,
    committed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn check(&self, operation: StoreOperation) -> Result<(), RepositoryError> {
        if lock(&self.failures).contains(&operation) {
            return Err(RepositoryError::OperationFailed(format!(
                "{:?} に失敗しました（注入された障害）",
                operation
            )));
        }
        Ok(())
    }
}

/// インメモリのチェックアウトストア
/// 開始時に状態のスナップショットを取り、コミット時にだけ反映する。
/// 失敗やロールバックでは何も残らない。開発・テスト用の実装
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutStore {
    inner: Arc<Inner>,
}

impl InMemoryCheckoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 商品の在庫数を設定する
    pub fn set_stock(&self, product_id: ProductId, quantity: u32) {
        lock(&self.inner.state).stock.insert(product_id, quantity);
    }

    /// コミット済みの在庫数を取得する
    pub fn stock(&self, product_id: ProductId) -> Option<u32> {
        lock(&self.inner.state).stock.get(&product_id).copied()
    }

    /// コミット済みの注文を明細付きで取得する
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        let state = lock(&self.inner.state);
        assemble(&state, order_id)
    }

    /// コミット済みの注文ヘッダ数
    pub fn order_count(&self) -> usize {
        lock(&self.inner.state).orders.len()
    }

    /// コミット済みの注文明細数
    pub fn order_item_count(&self) -> usize {
        lock(&self.inner.state).items.len()
    }

    /// 指定した操作を失敗させる（解除するまで有効）
    pub fn fail_on(&self, operation: StoreOperation) {
        lock(&self.inner.failures).insert(operation);
    }

    /// 障害注入をすべて解除する
    pub fn clear_failures(&self) {
        lock(&self.inner.failures).clear();
    }

    /// 開始されたトランザクション数
    pub fn transactions_begun(&self) -> usize {
        self.inner.begun.load(Ordering::SeqCst)
    }

    /// コミットされたトランザクション数
    pub fn transactions_committed(&self) -> usize {
        self.inner.committed.load(Ordering::SeqCst)
    }

    /// これまでに実行された一括減算（呼び出しごと）
    pub fn decrement_log(&self) -> Vec<Vec<StockDecrement>> {
        lock(&self.inner.decrement_log).clone()
    }
}

fn assemble(state: &StoreState, order_id: OrderId) -> Option<Order> {
    let header = state.orders.get(&order_id)?;
    let items = state
        .items
        .iter()
        .filter(|item| item.order_id() == order_id)
        .cloned()
        .collect();
    Some(Order::reconstruct(
        header.id(),
        header.user_id(),
        items,
        header.created_at(),
        header.updated_at(),
    ))
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, RepositoryError> {
        self.inner.check(StoreOperation::Begin)?;
        self.inner.begun.fetch_add(1, Ordering::SeqCst);
        let working = lock(&self.inner.state).clone();
        Ok(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            working,
        })
    }
}

/// インメモリストアのトランザクション
pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    working: StoreState,
}

#[async_trait]
impl CheckoutTransaction for InMemoryTransaction {
    async fn existing_order_ids(
        &mut self,
        order_ids: &[OrderId],
    ) -> Result<Vec<OrderId>, RepositoryError> {
        self.inner.check(StoreOperation::FetchExistingOrderIds)?;
        Ok(order_ids
            .iter()
            .filter(|id| self.working.orders.contains_key(*id))
            .copied()
            .collect())
    }

    async fn existing_order_item_ids(
        &mut self,
        item_ids: &[OrderItemId],
    ) -> Result<Vec<OrderItemId>, RepositoryError> {
        self.inner.check(StoreOperation::FetchExistingItemIds)?;
        let persisted: HashSet<OrderItemId> =
            self.working.items.iter().map(OrderItem::id).collect();
        Ok(item_ids
            .iter()
            .filter(|id| persisted.contains(*id))
            .copied()
            .collect())
    }

    async fn fetch_stock(
        &mut self,
        product_ids: &[ProductId],
    ) -> Result<Vec<ProductStock>, RepositoryError> {
        self.inner.check(StoreOperation::FetchStock)?;
        Ok(product_ids
            .iter()
            .filter_map(|id| {
                self.working
                    .stock
                    .get(id)
                    .map(|quantity| ProductStock::new(*id, *quantity))
            })
            .collect())
    }

    async fn decrement_stock(
        &mut self,
        decrements: &[StockDecrement],
    ) -> Result<(), RepositoryError> {
        self.inner.check(StoreOperation::DecrementStock)?;
        lock(&self.inner.decrement_log).push(decrements.to_vec());
        for decrement in decrements {
            // 在庫行のない商品は更新対象にならない
            let Some(quantity) = self.working.stock.get_mut(&decrement.product_id) else {
                continue;
            };
            *quantity = quantity.checked_sub(decrement.quantity).ok_or_else(|| {
                RepositoryError::OperationFailed(format!(
                    "在庫がマイナスになります: {}",
                    decrement.product_id
                ))
            })?;
        }
        Ok(())
    }

    async fn insert_orders(&mut self, orders: &[Order]) -> Result<(), RepositoryError> {
        self.inner.check(StoreOperation::InsertOrders)?;
        for order in orders {
            if self.working.orders.contains_key(&order.id()) {
                return Err(RepositoryError::OperationFailed(format!(
                    "注文IDが重複しています: {}",
                    order.id()
                )));
            }
            let header = Order::reconstruct(
                order.id(),
                order.user_id(),
                Vec::new(),
                order.created_at(),
                order.updated_at(),
            );
            self.working.orders.insert(order.id(), header);
        }
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<(), RepositoryError> {
        self.inner.check(StoreOperation::InsertOrderItems)?;
        for item in items {
            if !self.working.orders.contains_key(&item.order_id()) {
                return Err(RepositoryError::OperationFailed(format!(
                    "注文が存在しません: {}",
                    item.order_id()
                )));
            }
            if self.working.items.iter().any(|existing| existing.id() == item.id()) {
                return Err(RepositoryError::OperationFailed(format!(
                    "明細IDが重複しています: {}",
                    item.id()
                )));
            }
            self.working.items.push(item.clone());
        }
        Ok(())
    }

    async fn fetch_orders(&mut self, order_ids: &[OrderId]) -> Result<Vec<Order>, RepositoryError> {
        self.inner.check(StoreOperation::FetchOrders)?;
        Ok(order_ids
            .iter()
            .filter_map(|id| assemble(&self.working, *id))
            .collect())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.inner.check(StoreOperation::Commit)?;
        *lock(&self.inner.state) = self.working;
        self.inner.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
