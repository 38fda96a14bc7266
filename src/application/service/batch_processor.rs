use crate::application::service::{Delivery, PendingCheckout, ResultDispatcher};
use crate::application::CheckoutError;
use crate::domain::model::{CheckoutRequest, Order, OrderId, OrderItem, OrderItemId};
use crate::domain::port::{CheckoutStore, CheckoutTransaction};
use crate::domain::service::{DemandLedger, EvictionPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// バッチ処理器
///
/// 1バッチ分の要求を受け取り、商品ごとに需要を集約し、超過販売を解決し、
/// 生き残った注文を1トランザクションで永続化して、全要求に結果を1回ずつ配る。
///
/// バッチはウィンドウのループ内で1つずつ直列に処理される前提で、在庫の読み取りに
/// 行ロックを使っていない。並列化する場合はロック付き読み取りか
/// SERIALIZABLE 分離レベルが必要になる。
pub struct BatchProcessor<S: CheckoutStore> {
    store: Arc<S>,
    dispatcher: ResultDispatcher,
    policy: EvictionPolicy,
}

impl<S: CheckoutStore> BatchProcessor<S> {
    /// 新しいバッチ処理器を作成
    ///
    /// # Arguments
    /// * `store` - 在庫・注文ストア
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            dispatcher: ResultDispatcher::new(),
            policy: EvictionPolicy::default(),
        }
    }

    /// バッチを処理して結果を配信する
    ///
    /// # Returns
    /// * 配信タスクのハンドル（要求1件につき1つ）
    #[tracing::instrument(
        skip_all,
        name = "checkout_batch",
        fields(batch_id = %Uuid::new_v4(), batch_size = batch.len())
    )]
    pub async fn process(&self, batch: Vec<PendingCheckout>) -> Vec<JoinHandle<()>> {
        let started = Instant::now();
        let mut requests = Vec::with_capacity(batch.len());
        let mut responders = Vec::with_capacity(batch.len());
        let mut deliveries = Vec::with_capacity(batch.len());
        let mut seen_orders = HashSet::with_capacity(batch.len());
        let mut seen_items = HashSet::new();

        for PendingCheckout { request, responder } in batch {
            let rejection = if seen_orders.contains(&request.order_id()) {
                Some(CheckoutError::DuplicateOrder(request.order_id().to_string()))
            } else {
                request
                    .items()
                    .iter()
                    .find(|item| seen_items.contains(&item.id()))
                    .map(|item| CheckoutError::DuplicateOrderItem(item.id().to_string()))
            };
            if let Some(err) = rejection {
                warn!(
                    order_id = %request.order_id(),
                    error = %err,
                    "Duplicate id in batch, rejecting"
                );
                deliveries.push(Delivery {
                    order_id: request.order_id(),
                    trace_id: request.trace_id(),
                    responder,
                    result: Err(err),
                });
                continue;
            }
            seen_orders.insert(request.order_id());
            seen_items.extend(request.items().iter().map(OrderItem::id));
            requests.push(request);
            responders.push(responder);
        }

        if !requests.is_empty() {
            match self.execute(&requests).await {
                Ok(BatchOutcome {
                    mut persisted,
                    mut rejected,
                }) => {
                    info!(
                        persisted = persisted.len(),
                        rejected = rejected.len(),
                        out_of_stock = requests.len() - persisted.len() - rejected.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Checkout batch committed"
                    );
                    for (request, responder) in requests.iter().zip(responders) {
                        let result = match rejected.remove(&request.order_id()) {
                            Some(err) => Err(err),
                            None => persisted
                                .remove(&request.order_id())
                                .ok_or(CheckoutError::OutOfStock),
                        };
                        deliveries.push(Delivery {
                            order_id: request.order_id(),
                            trace_id: request.trace_id(),
                            responder,
                            result,
                        });
                    }
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Checkout batch failed, failing every request in the batch"
                    );
                    for (request, responder) in requests.iter().zip(responders) {
                        deliveries.push(Delivery {
                            order_id: request.order_id(),
                            trace_id: request.trace_id(),
                            responder,
                            result: Err(err.clone()),
                        });
                    }
                }
            }
        }

        self.dispatcher.dispatch(deliveries)
    }

    /// トランザクションを開始して中身を実行し、コミットまたはロールバックする
    async fn execute(&self, requests: &[CheckoutRequest]) -> Result<BatchOutcome, CheckoutError> {
        let mut tx = self.store.begin().await?;

        match self.run_in_transaction(&mut tx, requests).await {
            Ok(outcome) => {
                // コミット失敗時はトランザクションが破棄され、ストア側でロールバックされる
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn run_in_transaction(
        &self,
        tx: &mut S::Transaction,
        requests: &[CheckoutRequest],
    ) -> Result<BatchOutcome, CheckoutError> {
        let rejected = find_persisted_duplicates(tx, requests).await?;
        let admitted: Vec<CheckoutRequest> = requests
            .iter()
            .filter(|request| !rejected.contains_key(&request.order_id()))
            .cloned()
            .collect();
        if admitted.is_empty() {
            return Ok(BatchOutcome {
                persisted: HashMap::new(),
                rejected,
            });
        }

        let ledger = DemandLedger::merge(&admitted);
        debug!(products = ledger.product_ids().len(), "Demand merged");

        let product_ids = ledger.product_ids();
        let stock = tx.fetch_stock(&product_ids).await?;
        debug!(products = product_ids.len(), rows = stock.len(), "Stock read");

        let resolution = ledger.resolve(&stock, self.policy);
        if resolution.evicted_items() > 0 {
            info!(
                evicted_items = resolution.evicted_items(),
                "Oversell resolved by evicting items"
            );
        }

        tx.decrement_stock(&resolution.decrements()).await?;

        let orders: Vec<Order> = admitted
            .iter()
            .enumerate()
            .filter_map(|(index, request)| {
                let items = resolution.surviving_items(index, request);
                (!items.is_empty()).then(|| request.to_order(items))
            })
            .collect();
        let items: Vec<OrderItem> = orders
            .iter()
            .flat_map(|order| order.items().iter().cloned())
            .collect();

        tx.insert_orders(&orders).await?;
        tx.insert_order_items(&items).await?;
        debug!(orders = orders.len(), items = items.len(), "Orders inserted");

        let order_ids: Vec<OrderId> = orders.iter().map(Order::id).collect();
        let persisted = if order_ids.is_empty() {
            Vec::new()
        } else {
            tx.fetch_orders(&order_ids).await?
        };

        Ok(BatchOutcome {
            persisted: persisted
                .into_iter()
                .map(|order| (order.id(), order))
                .collect(),
            rejected,
        })
    }
}

/// コミットされたバッチの結果
struct BatchOutcome {
    persisted: HashMap<OrderId, Order>,
    /// 永続化済みのIDと衝突したため個別に拒否した要求
    rejected: HashMap<OrderId, CheckoutError>,
}

/// 注文IDまたは明細IDが既に永続化されている要求を探す
/// ここで見つかった要求は需要の集約にも挿入にも加わらない
async fn find_persisted_duplicates<T: CheckoutTransaction>(
    tx: &mut T,
    requests: &[CheckoutRequest],
) -> Result<HashMap<OrderId, CheckoutError>, CheckoutError> {
    let order_ids: Vec<OrderId> = requests.iter().map(CheckoutRequest::order_id).collect();
    let item_ids: Vec<OrderItemId> = requests
        .iter()
        .flat_map(|request| request.items().iter().map(OrderItem::id))
        .collect();
    let existing_orders: HashSet<OrderId> =
        tx.existing_order_ids(&order_ids).await?.into_iter().collect();
    let existing_items: HashSet<OrderItemId> =
        tx.existing_order_item_ids(&item_ids).await?.into_iter().collect();

    let mut rejected = HashMap::new();
    for request in requests {
        let err = if existing_orders.contains(&request.order_id()) {
            CheckoutError::DuplicateOrder(request.order_id().to_string())
        } else if let Some(item) = request
            .items()
            .iter()
            .find(|item| existing_items.contains(&item.id()))
        {
            CheckoutError::DuplicateOrderItem(item.id().to_string())
        } else {
            continue;
        };
        warn!(order_id = %request.order_id(), error = %err, "Already persisted, rejecting");
        rejected.insert(request.order_id(), err);
    }
    Ok(rejected)
}
