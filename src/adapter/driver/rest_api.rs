use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::driver::auth::{trusted_user_header, AuthenticatedUser};
use crate::adapter::driver::request_dto::CheckoutOrderRequest;
use crate::adapter::driver::response_dto::{
    ApiError, ApiResponse, CheckoutResponse, OrderResponse,
};
use crate::application::service::CheckoutGateway;
use crate::application::CheckoutError;

// アプリケーションサービスを含む状態
#[derive(Clone)]
pub struct AppState {
    pub checkout_gateway: Arc<CheckoutGateway>,
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), (StatusCode, Json<ApiError>)>;

// REST APIルーターを作成
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders/checkout", post(checkout))
        .layer(middleware::from_fn(trusted_user_header))
}

// ヘルスチェックエンドポイント
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "order-checkout-batching",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// チェックアウトエンドポイント
// 要求はバッチ処理のキューに入り、バッチの結果が届くか期限が来るまで待つ
#[tracing::instrument(skip_all, fields(user_id = %user.0, trace_id = tracing::field::Empty))]
async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<CheckoutOrderRequest>, JsonRejection>,
) -> ApiResult<CheckoutResponse> {
    let Json(body) = body.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
                "INVALID_REQUEST",
            )),
        )
    })?;

    let trace_id = Uuid::new_v4();
    tracing::Span::current().record("trace_id", tracing::field::display(trace_id));

    let request = body
        .into_checkout_request(user.0, trace_id)
        .map_err(|err| map_checkout_error(CheckoutError::from(err)))?;

    match state.checkout_gateway.checkout(request).await {
        Ok(order) => {
            info!(order_id = %order.id(), items = order.items().len(), "Checkout succeeded");
            // 注文は既にコミット済みなので、ここでの失敗はサーバー側の問題として扱う
            let order = OrderResponse::from_order(&order).map_err(|err| {
                warn!(error = %err, "Failed to build checkout response");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        err.to_string(),
                        "INTERNAL_ERROR",
                    )),
                )
            })?;
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::success(StatusCode::CREATED, CheckoutResponse { order })),
            ))
        }
        Err(err) => Err(map_checkout_error(err)),
    }
}

// チェックアウトエラーをHTTPエラーにマッピング
// 在庫切れ・入力エラーは400、期限切れ・基盤の失敗は500
fn map_checkout_error(err: CheckoutError) -> (StatusCode, Json<ApiError>) {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        warn!(error = %err, "Checkout failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiError::new(status, err.to_string(), err.code())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::InMemoryCheckoutStore;
    use crate::adapter::driver::auth::USER_ID_HEADER;
    use crate::application::service::{checkout_pipeline, PipelineConfig};
    use crate::domain::model::ProductId;
    use crate::domain::port::RepositoryError;
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    fn server(store: Arc<InMemoryCheckoutStore>) -> (TestServer, CancellationToken) {
        let (gateway, windower) = checkout_pipeline(store, PipelineConfig::default());
        let shutdown = CancellationToken::new();
        tokio::spawn(windower.run(shutdown.clone()));
        let app = create_router().with_state(AppState {
            checkout_gateway: Arc::new(gateway),
        });
        (TestServer::new(app).unwrap(), shutdown)
    }

    fn user_header() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health_check() {
        let (server, _shutdown) = server(Arc::new(InMemoryCheckoutStore::new()));
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_checkout_created() {
        let store = Arc::new(InMemoryCheckoutStore::new());
        let product_id = ProductId::new();
        store.set_stock(product_id, 5);
        let (server, _shutdown) = server(store.clone());

        let (name, value) = user_header();
        let response = server
            .post("/orders/checkout")
            .add_header(name, value)
            .json(&json!({
                "order_items": [
                    {"product_id": product_id.to_string(), "price": "3.10", "quantity": 2}
                ]
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["status"], "success");
        assert_eq!(body["statusCode"], 201);
        assert_eq!(body["data"]["order"]["order_items"][0]["quantity"], 2);
        assert_eq!(store.stock(product_id), Some(3));
    }

    #[tokio::test]
    async fn test_checkout_out_of_stock_is_bad_request() {
        let store = Arc::new(InMemoryCheckoutStore::new());
        let product_id = ProductId::new();
        store.set_stock(product_id, 0);
        let (server, _shutdown) = server(store);

        let (name, value) = user_header();
        let response = server
            .post("/orders/checkout")
            .add_header(name, value)
            .json(&json!({
                "order_items": [
                    {"product_id": product_id.to_string(), "price": 1, "quantity": 1}
                ]
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "OUT_OF_STOCK");
    }

    #[tokio::test]
    async fn test_checkout_without_user_is_unauthorized() {
        let (server, _shutdown) = server(Arc::new(InMemoryCheckoutStore::new()));
        let response = server
            .post("/orders/checkout")
            .json(&json!({"order_items": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_checkout_validation_error() {
        let store = Arc::new(InMemoryCheckoutStore::new());
        let (server, _shutdown) = server(store.clone());

        let (name, value) = user_header();
        let response = server
            .post("/orders/checkout")
            .add_header(name, value)
            .json(&json!({"order_items": []}))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
        assert_eq!(store.transactions_begun(), 0);
    }

    #[tokio::test]
    async fn test_checkout_rejects_out_of_range_price_before_queueing() {
        let store = Arc::new(InMemoryCheckoutStore::new());
        let product_id = ProductId::new();
        store.set_stock(product_id, 5);
        let (server, _shutdown) = server(store.clone());

        for price in ["79228162514264337593543950335", "10000000000", "1.005"] {
            let (name, value) = user_header();
            let response = server
                .post("/orders/checkout")
                .add_header(name, value)
                .json(&json!({
                    "order_items": [
                        {"product_id": product_id.to_string(), "price": price, "quantity": 2}
                    ]
                }))
                .await;

            assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "price {price}");
            assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
        }
        assert_eq!(store.transactions_begun(), 0);
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.stock(product_id), Some(5));
    }

    #[tokio::test]
    async fn test_checkout_malformed_body() {
        let (server, _shutdown) = server(Arc::new(InMemoryCheckoutStore::new()));
        let (name, value) = user_header();
        let response = server
            .post("/orders/checkout")
            .add_header(name, value)
            .json(&json!({
                "order_items": [{"product_id": "not-a-uuid", "price": 1, "quantity": 1}]
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "INVALID_REQUEST");
    }

    #[test]
    fn test_map_checkout_error_status() {
        let (status, Json(body)) = map_checkout_error(CheckoutError::OutOfStock);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "OUT_OF_STOCK");

        let (status, Json(body)) = map_checkout_error(CheckoutError::ProcessingTimeout);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status_code, 500);

        let (status, _) = map_checkout_error(CheckoutError::Store(
            RepositoryError::ConnectionFailed("down".into()),
        ));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
