use crate::application::service::{PendingCheckout, ResultSender};
use crate::application::CheckoutError;
use crate::domain::model::{CheckoutRequest, Order};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// チェックアウト受付ゲートウェイ
///
/// 要求を受付キューへ投入し、結果チャネルを期限付きで待つ。
/// 期限は投入と結果待ちを合わせた1つの締め切りとして扱う。
/// 複製しても同じキューを共有する。
#[derive(Debug, Clone)]
pub struct CheckoutGateway {
    sender: mpsc::Sender<PendingCheckout>,
    timeout: Duration,
}

impl CheckoutGateway {
    pub fn new(sender: mpsc::Sender<PendingCheckout>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// チェックアウトを実行する
    ///
    /// # Arguments
    /// * `request` - 検証済みのチェックアウト要求
    ///
    /// # Returns
    /// * `Ok(Order)` - 永続化された注文（在庫の都合で明細が減っていることがある）
    /// * `Err(CheckoutError)` - 在庫切れ、期限切れ、停止中、またはバッチ全体の失敗
    #[tracing::instrument(
        skip_all,
        fields(order_id = %request.order_id(), trace_id = %request.trace_id())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
        let deadline = Instant::now() + self.timeout;
        let (responder, receiver): (ResultSender, _) = oneshot::channel();

        let pending = PendingCheckout { request, responder };
        match timeout_at(deadline, self.sender.send(pending)).await {
            Err(_) => {
                debug!("Checkout queue full until deadline");
                return Err(CheckoutError::AdmissionTimeout);
            }
            Ok(Err(_)) => return Err(CheckoutError::ShuttingDown),
            Ok(Ok(())) => {}
        }

        match timeout_at(deadline, receiver).await {
            // 期限切れで受信側を破棄する。後から届いた結果は捨てられる
            Err(_) => Err(CheckoutError::ProcessingTimeout),
            Ok(Err(_)) => Err(CheckoutError::ResultChannelClosed),
            Ok(Ok(result)) => result,
        }
    }
}
