use crate::adapter::database_config::{parse_var, var_or, ConfigError};
use crate::application::service::{PipelineConfig, WindowerConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// チェックアウトのバッチ処理とHTTPサーバーの設定
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// バッチウィンドウの間隔
    pub tick_interval: Duration,
    /// 受付キューの容量
    pub queue_capacity: usize,
    /// 呼び出し側の期限
    pub checkout_timeout: Duration,
    /// 1バッチの上限件数（`None` は無制限）
    pub max_batch_size: Option<usize>,
    pub server_addr: SocketAddr,
}

impl CheckoutConfig {
    /// 環境変数から設定を読み取る
    ///
    /// | 変数 | デフォルト |
    /// |---|---|
    /// | `CHECKOUT_TICK_MS` | 300 |
    /// | `CHECKOUT_QUEUE_CAPACITY` | 1024 |
    /// | `CHECKOUT_TIMEOUT_MS` | 3000 |
    /// | `CHECKOUT_MAX_BATCH_SIZE` | 0（無制限） |
    /// | `SERVER_ADDR` | 0.0.0.0:3000 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let tick_ms: u64 = parse_var("CHECKOUT_TICK_MS", 300)?;
        if tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CHECKOUT_TICK_MS must be greater than 0".to_string(),
            ));
        }
        let queue_capacity: usize = parse_var("CHECKOUT_QUEUE_CAPACITY", 1024)?;
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CHECKOUT_QUEUE_CAPACITY must be greater than 0".to_string(),
            ));
        }
        let timeout_ms: u64 = parse_var("CHECKOUT_TIMEOUT_MS", 3000)?;
        let max_batch_size: usize = parse_var("CHECKOUT_MAX_BATCH_SIZE", 0)?;
        let server_addr = var_or("SERVER_ADDR", "0.0.0.0:3000")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid SERVER_ADDR: {}", e)))?;

        Ok(Self {
            tick_interval: Duration::from_millis(tick_ms),
            queue_capacity,
            checkout_timeout: Duration::from_millis(timeout_ms),
            max_batch_size: (max_batch_size > 0).then_some(max_batch_size),
            server_addr,
        })
    }

    /// パイプライン設定に変換する
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            checkout_timeout: self.checkout_timeout,
            windower: WindowerConfig {
                tick_interval: self.tick_interval,
                max_batch_size: self.max_batch_size,
            },
        }
    }
}
