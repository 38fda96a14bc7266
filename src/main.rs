use order_checkout_batching::adapter::driven::MySqlCheckoutStore;
use order_checkout_batching::adapter::driver::rest_api::{create_router, AppState};
use order_checkout_batching::adapter::driver::shutdown::shutdown_signal;
use order_checkout_batching::adapter::{CheckoutConfig, DatabaseConfig, DatabaseMigration};
use order_checkout_batching::application::service::checkout_pipeline;

use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let db_config = DatabaseConfig::from_env()?;
    let checkout_config = CheckoutConfig::from_env()?;
    info!(
        host = %db_config.host,
        port = db_config.port,
        tick_ms = checkout_config.tick_interval.as_millis() as u64,
        queue_capacity = checkout_config.queue_capacity,
        "Configuration loaded"
    );

    // 接続プールを作成
    let pool = MySqlPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(db_config.acquire_timeout)
        .connect(&db_config.connection_string())
        .await?;

    DatabaseMigration::new(pool.clone()).run().await?;

    // バッチ処理パイプラインを組み立てる
    let store = Arc::new(MySqlCheckoutStore::new(pool.clone()));
    let (gateway, windower) = checkout_pipeline(store, checkout_config.pipeline());
    let shutdown = CancellationToken::new();
    let windower_handle = tokio::spawn(windower.run(shutdown.clone()));

    let app_state = AppState {
        checkout_gateway: Arc::new(gateway),
    };
    let app = create_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(checkout_config.server_addr).await?;
    info!(addr = %checkout_config.server_addr, "REST API server started");
    info!("  GET  /health - ヘルスチェック");
    info!("  POST /orders/checkout - チェックアウト");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // 受付を止めた後、キューに残った要求を処理してから終了する
    shutdown.cancel();
    windower_handle.await?;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
