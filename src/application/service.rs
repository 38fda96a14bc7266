// チェックアウトのバッチ化パイプライン
//
// CheckoutGateway → (有界キュー) → BatchWindower → BatchProcessor → ResultDispatcher
// キューの読み手は BatchWindower の1タスクだけで、バッチは常に1つずつ直列に処理される

mod batch_processor;
mod batch_windower;
mod checkout_gateway;
mod result_dispatcher;

pub use batch_processor::BatchProcessor;
pub use batch_windower::{BatchWindower, WindowerConfig};
pub use checkout_gateway::CheckoutGateway;
pub use result_dispatcher::{Delivery, ResultDispatcher};

use crate::application::CheckoutError;
use crate::domain::model::{CheckoutRequest, Order};
use crate::domain::port::CheckoutStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// 1件のチェックアウトの結果
pub type CheckoutResult = Result<Order, CheckoutError>;

/// 結果チャネルの送信側
/// 送信で消費されるので、書き込みは型の上で高々1回になる
pub type ResultSender = oneshot::Sender<CheckoutResult>;

/// キューに投入される要求
/// データ部はバッチ処理器へ、送信側は結果配信へ渡る
#[derive(Debug)]
pub struct PendingCheckout {
    pub request: CheckoutRequest,
    pub responder: ResultSender,
}

/// パイプライン設定
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 受付キューの容量
    pub queue_capacity: usize,
    /// 呼び出し側の期限（投入と結果待ちの両方に適用）
    pub checkout_timeout: Duration,
    pub windower: WindowerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            checkout_timeout: Duration::from_secs(3),
            windower: WindowerConfig::default(),
        }
    }
}

/// 受付ゲートウェイとバッチウィンドウを有界キューでつないで作成する
///
/// # Returns
/// * `(CheckoutGateway, BatchWindower)` - ウィンドウ側は `run` で起動する
pub fn checkout_pipeline<S: CheckoutStore>(
    store: Arc<S>,
    config: PipelineConfig,
) -> (CheckoutGateway, BatchWindower<S>) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let gateway = CheckoutGateway::new(sender, config.checkout_timeout);
    let windower = BatchWindower::new(receiver, BatchProcessor::new(store), config.windower);
    (gateway, windower)
}
