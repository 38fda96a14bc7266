use crate::domain::error::DomainError;
use crate::domain::model::{
    CheckoutRequest, Money, OrderId, OrderItem, OrderItemId, ProductId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// チェックアウト明細のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutItemRequest {
    /// 省略時はサーバー側で採番する
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    pub price: Decimal,
    pub quantity: u32,
}

/// チェックアウト用のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutOrderRequest {
    /// 省略時はサーバー側で採番する
    pub id: Option<Uuid>,
    /// 指定する場合は認証済みユーザーと一致しなければならない
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub order_items: Vec<CheckoutItemRequest>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckoutOrderRequest {
    /// 検証済みのチェックアウト要求に変換する
    ///
    /// # Arguments
    /// * `user_id` - 認証済みユーザーID
    /// * `trace_id` - ログ相関用のID
    pub fn into_checkout_request(
        self,
        user_id: UserId,
        trace_id: Uuid,
    ) -> Result<CheckoutRequest, DomainError> {
        if let Some(body_user_id) = self.user_id {
            if UserId::from_uuid(body_user_id) != user_id {
                return Err(DomainError::OrderValidation(
                    "user_id が認証済みユーザーと一致しません".to_string(),
                ));
            }
        }

        let order_id = self.id.map(OrderId::from_uuid).unwrap_or_else(OrderId::new);
        let now = Utc::now();
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at);

        let items = self
            .order_items
            .into_iter()
            .map(|item| {
                OrderItem::new(
                    item.id.map(OrderItemId::from_uuid).unwrap_or_else(OrderItemId::new),
                    order_id,
                    ProductId::from_uuid(item.product_id),
                    Money::new(item.price)?,
                    item.quantity,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        CheckoutRequest::new(order_id, user_id, items, created_at, updated_at, trace_id)
    }
}
