use crate::adapter::database_error::DatabaseError;
use sqlx::{MySql, Pool};
use tracing::info;

const MIGRATIONS: [(&str, &str); 3] = [
    (
        "001_create_products_table",
        include_str!("../../migrations/001_create_products_table.sql"),
    ),
    (
        "002_create_orders_table",
        include_str!("../../migrations/002_create_orders_table.sql"),
    ),
    (
        "003_create_order_items_table",
        include_str!("../../migrations/003_create_order_items_table.sql"),
    ),
];

/// データベースマイグレーションを管理する構造体
pub struct DatabaseMigration {
    pool: Pool<MySql>,
}

impl DatabaseMigration {
    /// 新しいDatabaseMigrationインスタンスを作成
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// マイグレーションを順番に実行する
    /// CREATE TABLE IF NOT EXISTS なので何度実行してもよい
    pub async fn run(&self) -> Result<(), DatabaseError> {
        for (name, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::MigrationError(format!("{} failed: {}", name, e)))?;
            info!(migration = name, "Migration applied");
        }
        Ok(())
    }
}
