use crate::application::service::{CheckoutResult, ResultSender};
use crate::domain::model::OrderId;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};
use uuid::Uuid;

/// 1件分の配信
#[derive(Debug)]
pub struct Delivery {
    pub order_id: OrderId,
    pub trace_id: Uuid,
    pub responder: ResultSender,
    pub result: CheckoutResult,
}

/// 結果配信
/// バッチの最終状態（コミット成功または全体失敗）が確定した後に、
/// 要求ごとに独立したタスクで結果を書き込む。順序には意味がない。
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultDispatcher;

impl ResultDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// 配信タスクを起動する
    /// 返り値のハンドルは待たなくてもよい（破棄してもタスクは動き続ける）
    pub fn dispatch(&self, deliveries: Vec<Delivery>) -> Vec<JoinHandle<()>> {
        deliveries
            .into_iter()
            .map(|delivery| {
                let span = tracing::debug_span!(
                    "deliver_checkout_result",
                    order_id = %delivery.order_id,
                    trace_id = %delivery.trace_id,
                );
                tokio::spawn(deliver(delivery).instrument(span))
            })
            .collect()
    }
}

async fn deliver(delivery: Delivery) {
    let succeeded = delivery.result.is_ok();
    // 送信側は閉じない。受付側が受信後に破棄する
    if delivery.responder.send(delivery.result).is_err() {
        debug!("Caller already abandoned the checkout, result dropped");
    } else {
        debug!(succeeded, "Checkout result delivered");
    }
}
