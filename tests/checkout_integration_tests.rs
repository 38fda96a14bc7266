use chrono::Utc;
use order_checkout_batching::adapter::driven::{InMemoryCheckoutStore, StoreOperation};
use order_checkout_batching::application::service::{
    checkout_pipeline, CheckoutGateway, PipelineConfig, WindowerConfig,
};
use order_checkout_batching::application::CheckoutError;
use order_checkout_batching::domain::model::{
    CheckoutRequest, Money, OrderId, OrderItem, OrderItemId, ProductId, UserId,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// テスト用ヘルパー
struct Harness {
    store: Arc<InMemoryCheckoutStore>,
    gateway: CheckoutGateway,
    shutdown: CancellationToken,
    windower: JoinHandle<()>,
}

impl Harness {
    fn start(config: PipelineConfig) -> Self {
        let store = Arc::new(InMemoryCheckoutStore::new());
        let (gateway, windower) = checkout_pipeline(store.clone(), config);
        let shutdown = CancellationToken::new();
        let windower = tokio::spawn(windower.run(shutdown.clone()));
        Self {
            store,
            gateway,
            shutdown,
            windower,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.windower.await.unwrap();
    }
}

fn request(lines: &[(ProductId, u32)]) -> CheckoutRequest {
    let order_id = OrderId::new();
    let items = lines
        .iter()
        .map(|(product_id, quantity)| {
            OrderItem::new(
                OrderItemId::new(),
                order_id,
                *product_id,
                Money::new(dec!(10.00)).unwrap(),
                *quantity,
            )
            .unwrap()
        })
        .collect();
    let now = Utc::now();
    CheckoutRequest::new(order_id, UserId::new(), items, now, now, Uuid::new_v4()).unwrap()
}

/// 在庫5の商品に3個と4個の要求が同じバッチで届くと、後着の要求が取り除かれる
#[tokio::test(start_paused = true)]
async fn test_scenario_oversell_evicts_last_arrival() {
    let harness = Harness::start(PipelineConfig::default());
    let p = ProductId::new();
    harness.store.set_stock(p, 5);

    let (a, b) = tokio::join!(
        harness.gateway.checkout(request(&[(p, 3)])),
        harness.gateway.checkout(request(&[(p, 4)])),
    );

    let order = a.unwrap();
    assert_eq!(order.items()[0].quantity(), 3);
    assert_eq!(order.total().unwrap().amount(), dec!(30.00));
    assert_eq!(b, Err(CheckoutError::OutOfStock));
    assert_eq!(harness.store.stock(p), Some(2));
    assert_eq!(harness.store.transactions_begun(), 1);

    harness.stop().await;
}

/// 在庫0の商品だけを要求すると在庫切れになり、在庫は0のまま
#[tokio::test(start_paused = true)]
async fn test_scenario_zero_stock() {
    let harness = Harness::start(PipelineConfig::default());
    let q = ProductId::new();
    harness.store.set_stock(q, 0);

    let result = harness.gateway.checkout(request(&[(q, 2)])).await;

    assert_eq!(result, Err(CheckoutError::OutOfStock));
    assert_eq!(harness.store.stock(q), Some(0));
    assert_eq!(harness.store.order_count(), 0);

    harness.stop().await;
}

/// 無関係な商品への要求は互いに干渉しない
#[tokio::test(start_paused = true)]
async fn test_scenario_unrelated_products() {
    let harness = Harness::start(PipelineConfig::default());
    let (r, s, other) = (ProductId::new(), ProductId::new(), ProductId::new());
    harness.store.set_stock(r, 1);
    harness.store.set_stock(s, 1);
    harness.store.set_stock(other, 9);

    let (d, e) = tokio::join!(
        harness.gateway.checkout(request(&[(r, 1)])),
        harness.gateway.checkout(request(&[(s, 1)])),
    );

    assert!(d.is_ok());
    assert!(e.is_ok());
    assert_eq!(harness.store.stock(r), Some(0));
    assert_eq!(harness.store.stock(s), Some(0));
    assert_eq!(harness.store.stock(other), Some(9));
    let touched: Vec<ProductId> = harness.store.decrement_log()[0]
        .iter()
        .map(|d| d.product_id)
        .collect();
    assert_eq!(touched.len(), 2);
    assert!(!touched.contains(&other));

    harness.stop().await;
}

/// 明細の挿入で失敗するとバッチ全体が同じエラーになり、何も残らない。次のバッチは成功する
#[tokio::test(start_paused = true)]
async fn test_scenario_batch_failure_rolls_back() {
    let harness = Harness::start(PipelineConfig::default());
    let (r, s) = (ProductId::new(), ProductId::new());
    harness.store.set_stock(r, 1);
    harness.store.set_stock(s, 1);
    harness.store.fail_on(StoreOperation::InsertOrderItems);

    let (d, e) = tokio::join!(
        harness.gateway.checkout(request(&[(r, 1)])),
        harness.gateway.checkout(request(&[(s, 1)])),
    );

    let d_err = d.unwrap_err();
    assert!(matches!(d_err, CheckoutError::Store(_)));
    assert_eq!(Err(d_err), e);
    assert_eq!(harness.store.order_count(), 0);
    assert_eq!(harness.store.order_item_count(), 0);
    assert_eq!(harness.store.stock(r), Some(1));
    assert_eq!(harness.store.stock(s), Some(1));

    harness.store.clear_failures();
    let (d, e) = tokio::join!(
        harness.gateway.checkout(request(&[(r, 1)])),
        harness.gateway.checkout(request(&[(s, 1)])),
    );
    assert!(d.is_ok());
    assert!(e.is_ok());
    assert_eq!(harness.store.order_count(), 2);

    harness.stop().await;
}

/// 要求ごとに結果がちょうど1つ届き、在庫を超えて売らない
#[tokio::test(start_paused = true)]
async fn test_every_request_gets_one_result() {
    let harness = Harness::start(PipelineConfig::default());
    let p = ProductId::new();
    harness.store.set_stock(p, 10);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let gateway = harness.gateway.clone();
            tokio::spawn(async move { gateway.checkout(request(&[(p, 1)])).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CheckoutError::OutOfStock) => out_of_stock += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(out_of_stock, 40);
    assert_eq!(harness.store.stock(p), Some(0));
    assert_eq!(harness.store.order_count(), 10);

    harness.stop().await;
}

/// 空のティックではトランザクションを開始しない
#[tokio::test(start_paused = true)]
async fn test_empty_ticks_are_no_ops() {
    let harness = Harness::start(PipelineConfig::default());

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(harness.store.transactions_begun(), 0);
    harness.stop().await;
}

/// 停止時にバッファとキューに残った要求を処理してから終了する
#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_pending_requests() {
    let config = PipelineConfig {
        windower: WindowerConfig {
            tick_interval: Duration::from_secs(3600),
            max_batch_size: None,
        },
        ..PipelineConfig::default()
    };
    let harness = Harness::start(config);
    let p = ProductId::new();
    harness.store.set_stock(p, 3);

    let gateway = harness.gateway.clone();
    let pending = tokio::spawn(async move { gateway.checkout(request(&[(p, 2)])).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    harness.stop().await;

    assert!(pending.await.unwrap().is_ok());
}

/// 期限内に結果が届かないとタイムアウトになるが、要求は後で処理されうる
#[tokio::test(start_paused = true)]
async fn test_processing_timeout_then_late_processing() {
    let config = PipelineConfig {
        checkout_timeout: Duration::from_secs(1),
        windower: WindowerConfig {
            tick_interval: Duration::from_secs(10),
            max_batch_size: None,
        },
        ..PipelineConfig::default()
    };
    let harness = Harness::start(config);
    let p = ProductId::new();
    harness.store.set_stock(p, 3);

    let result = harness.gateway.checkout(request(&[(p, 1)])).await;
    assert_eq!(result, Err(CheckoutError::ProcessingTimeout));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.store.stock(p), Some(2));
    assert_eq!(harness.store.order_count(), 1);

    harness.stop().await;
}

/// 停止後の要求は ShuttingDown になる
#[tokio::test]
async fn test_checkout_after_shutdown() {
    let harness = Harness::start(PipelineConfig::default());
    let gateway = harness.gateway.clone();
    harness.stop().await;

    let result = gateway.checkout(request(&[(ProductId::new(), 1)])).await;
    assert_eq!(result, Err(CheckoutError::ShuttingDown));
}
