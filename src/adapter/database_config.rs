use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 設定エラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// 環境変数を読み取る。未設定ならデフォルト値
pub(crate) fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 環境変数を読み取って解析する。未設定ならデフォルト値
pub(crate) fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// データベース接続設定を管理する構造体
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    /// コネクション取得の待ち時間
    pub acquire_timeout: Duration,
    /// 設定されていれば個別の項目より優先する接続URL
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// 環境変数から設定を読み取る
    /// 環境変数が設定されていない場合はデフォルト値を使用
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var_or("DATABASE_HOST", "localhost"),
            port: parse_var("DATABASE_PORT", 3306)?,
            database: var_or("DATABASE_NAME", "checkout_db"),
            username: var_or("DATABASE_USER", "checkout_user"),
            password: var_or("DATABASE_PASSWORD", "checkout_password"),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            acquire_timeout: Duration::from_millis(parse_var(
                "DATABASE_ACQUIRE_TIMEOUT_MS",
                5000,
            )?),
            url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
        })
    }

    /// MySQL接続文字列を生成
    pub fn connection_string(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            ),
        }
    }
}
