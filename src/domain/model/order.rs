use crate::domain::error::DomainError;
use crate::domain::model::{Money, OrderId, OrderItemId, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// 注文明細
/// チェックアウト要求に含まれる明細であり、生き残れば永続化される明細でもある
/// 作成後は変更されない
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    price: Money,
    quantity: u32,
}

impl OrderItem {
    /// 新しい注文明細を作成
    /// 数量は1以上である必要がある
    pub fn new(
        id: OrderItemId,
        order_id: OrderId,
        product_id: ProductId,
        price: Money,
        quantity: u32,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }
        Ok(Self {
            id,
            order_id,
            product_id,
            price,
            quantity,
        })
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    /// 所属する注文のID
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// 単価
    pub fn price(&self) -> Money {
        self.price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// 小計（単価 × 数量）
    pub fn subtotal(&self) -> Result<Money, DomainError> {
        self.price.multiply(self.quantity)
    }
}

/// チェックアウト要求のデータ部
/// 結果チャネルは受付側が保持し、このデータだけがバッチ処理に渡る
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    order_id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    trace_id: Uuid,
}

impl CheckoutRequest {
    /// 検証済みのチェックアウト要求を作成
    ///
    /// # Arguments
    /// * `order_id` - 注文ID
    /// * `user_id` - 認証済み利用者ID
    /// * `items` - 要求明細（到着順）
    /// * `created_at` / `updated_at` - タイムスタンプ
    /// * `trace_id` - トレース相関ID
    ///
    /// # Returns
    /// * `Err(DomainError::OrderValidation)` - 明細が空、または明細の所属やIDが不正
    /// * `Err(DomainError::InvalidValue)` - 合計金額が計算できない
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        trace_id: Uuid,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::OrderValidation(
                "注文明細が空です".to_string(),
            ));
        }
        if let Some(item) = items.iter().find(|item| item.order_id() != order_id) {
            return Err(DomainError::OrderValidation(format!(
                "明細 {} は注文 {} に属していません",
                item.id(),
                order_id
            )));
        }
        let mut item_ids = HashSet::with_capacity(items.len());
        if let Some(item) = items.iter().find(|item| !item_ids.insert(item.id())) {
            return Err(DomainError::OrderValidation(format!(
                "明細ID {} が重複しています",
                item.id()
            )));
        }
        // 生き残る明細は要求明細の部分集合なので、ここで計算できれば永続化後も計算できる
        items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.add(&item.subtotal()?))?;
        Ok(Self {
            order_id,
            user_id,
            items,
            created_at,
            updated_at,
            trace_id,
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 要求明細（到着順）
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// トレース相関ID
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// 生き残った明細で注文ヘッダを作る
    pub fn to_order(&self, items: Vec<OrderItem>) -> Order {
        Order::reconstruct(
            self.order_id,
            self.user_id,
            items,
            self.created_at,
            self.updated_at,
        )
    }
}

/// 永続化された注文
/// バッチ処理のトランザクション内で作成され、以後このサブシステムでは変更しない
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// データベースから取得したデータで注文を再構築
    pub fn reconstruct(
        id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            items,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 合計金額
    pub fn total(&self) -> Result<Money, DomainError> {
        self.items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.add(&item.subtotal()?))
    }
}
