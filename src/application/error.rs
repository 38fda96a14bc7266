use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;

/// チェックアウトのエラー型
/// 受付エラー、容量・タイムアウト、在庫切れ、バッチ全体の失敗を表現する
/// バッチ失敗時は同じ値を全要求に配るため Clone 可能
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckoutError {
    /// 入力検証エラー（キューには入らない）
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),
    /// 期限内にキューへ投入できなかった
    #[error("Checkout admission timed out")]
    AdmissionTimeout,
    /// 期限内に結果が届かなかった（後で処理される可能性がある）
    #[error("Checkout processing timed out")]
    ProcessingTimeout,
    /// 明細がすべて在庫切れで取り除かれた
    #[error("Products are out of stock")]
    OutOfStock,
    /// 同じ注文IDの要求が同じバッチに既にある、または永続化済み
    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),
    /// 同じ明細IDが同じバッチの別の要求にある、または永続化済み
    #[error("Duplicate order item: {0}")]
    DuplicateOrderItem(String),
    /// バッチ処理器が停止している
    #[error("Checkout service is shutting down")]
    ShuttingDown,
    /// 結果を書き込まずに結果チャネルが破棄された
    #[error("Result channel closed before delivery")]
    ResultChannelClosed,
    /// ストアの失敗（バッチ全体の失敗）
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),
}

impl CheckoutError {
    /// 呼び出し側の問題（400系）かどうか
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CheckoutError::Validation(_)
                | CheckoutError::OutOfStock
                | CheckoutError::DuplicateOrder(_)
                | CheckoutError::DuplicateOrderItem(_)
        )
    }

    /// エラーコード
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "VALIDATION_ERROR",
            CheckoutError::AdmissionTimeout => "ADMISSION_TIMEOUT",
            CheckoutError::ProcessingTimeout => "PROCESSING_TIMEOUT",
            CheckoutError::OutOfStock => "OUT_OF_STOCK",
            CheckoutError::DuplicateOrder(_) => "DUPLICATE_ORDER",
            CheckoutError::DuplicateOrderItem(_) => "DUPLICATE_ORDER_ITEM",
            CheckoutError::ShuttingDown => "SHUTTING_DOWN",
            CheckoutError::ResultChannelClosed => "RESULT_CHANNEL_CLOSED",
            CheckoutError::Store(_) => "REPOSITORY_ERROR",
        }
    }
}
