use crate::domain::error::DomainError;
use crate::domain::model::{Order, OrderItem};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 成功時のレスポンスエンベロープ
/// `{ "status": "success", "statusCode": 201, "data": { ... } }`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: String,
    pub status_code: u16,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(status: StatusCode, data: T) -> Self {
        Self {
            status: "success".to_string(),
            status_code: status.as_u16(),
            data,
        }
    }
}

/// 失敗時のレスポンスエンベロープ
/// `{ "status": "error", "statusCode": 400, "message": "...", "code": "..." }`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: String,
    pub status_code: u16,
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            status_code: status.as_u16(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// チェックアウト成功時のデータ部
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
}

/// 注文のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub order_items: Vec<OrderItemResponse>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 注文明細のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl OrderResponse {
    /// ドメインオブジェクトからOrderResponseを作成
    /// 合計金額が計算できない場合はエラー
    pub fn from_order(order: &Order) -> Result<Self, DomainError> {
        Ok(Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            order_items: order
                .items()
                .iter()
                .map(OrderItemResponse::from_item)
                .collect(),
            total: order.total()?.amount(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        })
    }
}

impl OrderItemResponse {
    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            id: item.id().to_string(),
            order_id: item.order_id().to_string(),
            product_id: item.product_id().to_string(),
            price: item.price().amount(),
            quantity: item.quantity(),
        }
    }
}
