// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::model::{Order, OrderId, OrderItem, OrderItemId, ProductId, ProductStock};
use async_trait::async_trait;

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
/// バッチ内の全要求に同じエラーを配るため Clone 可能
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// 操作に失敗
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// データの取得に失敗
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
}

/// 在庫の一括減算の1件分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// チェックアウトストアトレイト
/// 在庫テーブルと注文テーブルをまとめて扱うストアを抽象化する
#[async_trait]
pub trait CheckoutStore: Send + Sync + 'static {
    type Transaction: CheckoutTransaction;

    /// トランザクションを開始する
    ///
    /// # Returns
    /// * `Ok(Transaction)` - 開始成功
    /// * `Err(RepositoryError)` - 開始失敗（バッチ全体が失敗する）
    async fn begin(&self) -> Result<Self::Transaction, RepositoryError>;
}

/// バッチ1回分のトランザクション
/// 以下の操作はすべて同じトランザクション内で行われる
#[async_trait]
pub trait CheckoutTransaction: Send {
    /// 指定された注文IDのうち、既に永続化されているものを返す
    async fn existing_order_ids(
        &mut self,
        order_ids: &[OrderId],
    ) -> Result<Vec<OrderId>, RepositoryError>;

    /// 指定された明細IDのうち、既に永続化されているものを返す
    async fn existing_order_item_ids(
        &mut self,
        item_ids: &[OrderItemId],
    ) -> Result<Vec<OrderItemId>, RepositoryError>;

    /// 指定された商品の現在の在庫数を取得する
    /// 在庫行が存在しない商品は結果に含まれない
    async fn fetch_stock(
        &mut self,
        product_ids: &[ProductId],
    ) -> Result<Vec<ProductStock>, RepositoryError>;

    /// 在庫を一括で減算する
    /// 商品IDをキーにした単一の条件付き更新として実行し、対象は渡された商品だけに限る
    async fn decrement_stock(
        &mut self,
        decrements: &[StockDecrement],
    ) -> Result<(), RepositoryError>;

    /// 注文ヘッダを一括で挿入する（明細は挿入しない）
    async fn insert_orders(&mut self, orders: &[Order]) -> Result<(), RepositoryError>;

    /// 注文明細を一括で挿入する
    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<(), RepositoryError>;

    /// 注文を明細付きで取得する
    async fn fetch_orders(&mut self, order_ids: &[OrderId]) -> Result<Vec<Order>, RepositoryError>;

    /// コミットする
    async fn commit(self) -> Result<(), RepositoryError>;

    /// ロールバックする
    async fn rollback(self) -> Result<(), RepositoryError>;
}
