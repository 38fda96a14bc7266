use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    Money, Order, OrderId, OrderItem, OrderItemId, ProductId, ProductStock, UserId,
};
use crate::domain::port::{CheckoutStore, CheckoutTransaction, RepositoryError, StockDecrement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, QueryBuilder, Row, Transaction};
use std::collections::HashMap;

// 1文あたりの行数の上限（プレースホルダ数の上限 65535 に収める）
const ROWS_PER_STATEMENT: usize = 1000;

/// MySQLチェックアウトストア
/// products / orders / order_items テーブルを1つのトランザクションで扱う
pub struct MySqlCheckoutStore {
    pool: Pool<MySql>,
}

impl MySqlCheckoutStore {
    /// 新しいMySQLチェックアウトストアを作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckoutStore for MySqlCheckoutStore {
    type Transaction = MySqlCheckoutTransaction;

    async fn begin(&self) -> Result<MySqlCheckoutTransaction, RepositoryError> {
        let tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::ConnectionError(format!(
                "トランザクション開始に失敗しました: {}",
                e
            ))
        })?;
        Ok(MySqlCheckoutTransaction { tx })
    }
}

/// MySQLのバッチ用トランザクション
/// コミットせずに破棄された場合は sqlx がロールバックする
pub struct MySqlCheckoutTransaction {
    tx: Transaction<'static, MySql>,
}

fn query_error(context: &str, e: sqlx::Error) -> RepositoryError {
    DatabaseError::QueryError(format!("{}: {}", context, e)).into()
}

fn decode_error(context: &str, e: impl std::fmt::Display) -> RepositoryError {
    DatabaseError::DecodeError(format!("{}: {}", context, e)).into()
}

impl MySqlCheckoutTransaction {
    /// 指定テーブルに既に存在するIDを返す
    async fn select_existing_ids(
        &mut self,
        table: &'static str,
        ids: &[String],
    ) -> Result<Vec<String>, RepositoryError> {
        let mut found = Vec::new();
        for chunk in ids.chunks(ROWS_PER_STATEMENT) {
            let mut builder =
                QueryBuilder::<MySql>::new(format!("SELECT id FROM {} WHERE id IN (", table));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| query_error("既存IDの取得に失敗しました", e))?;
            for row in &rows {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| decode_error("既存IDの取得に失敗しました", e))?;
                found.push(id);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl CheckoutTransaction for MySqlCheckoutTransaction {
    async fn existing_order_ids(
        &mut self,
        order_ids: &[OrderId],
    ) -> Result<Vec<OrderId>, RepositoryError> {
        let ids: Vec<String> = order_ids.iter().map(ToString::to_string).collect();
        self.select_existing_ids("orders", &ids)
            .await?
            .iter()
            .map(|id| {
                OrderId::from_string(id)
                    .map_err(|e| decode_error("注文IDの解析に失敗しました", e))
            })
            .collect()
    }

    async fn existing_order_item_ids(
        &mut self,
        item_ids: &[OrderItemId],
    ) -> Result<Vec<OrderItemId>, RepositoryError> {
        let ids: Vec<String> = item_ids.iter().map(ToString::to_string).collect();
        self.select_existing_ids("order_items", &ids)
            .await?
            .iter()
            .map(|id| {
                OrderItemId::from_string(id)
                    .map_err(|e| decode_error("明細IDの解析に失敗しました", e))
            })
            .collect()
    }

    async fn fetch_stock(
        &mut self,
        product_ids: &[ProductId],
    ) -> Result<Vec<ProductStock>, RepositoryError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<MySql>::new("SELECT id, quantity FROM products WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in product_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = builder
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| query_error("在庫の取得に失敗しました", e))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| decode_error("商品IDの取得に失敗しました", e))?;
                let product_id = ProductId::from_string(&id)
                    .map_err(|e| decode_error("商品IDの解析に失敗しました", e))?;
                let quantity: u32 = row
                    .try_get("quantity")
                    .map_err(|e| decode_error("在庫数の取得に失敗しました", e))?;
                Ok(ProductStock::new(product_id, quantity))
            })
            .collect()
    }

    async fn decrement_stock(
        &mut self,
        decrements: &[StockDecrement],
    ) -> Result<(), RepositoryError> {
        if decrements.is_empty() {
            return Ok(());
        }

        // UPDATE products SET quantity = CASE id WHEN ? THEN quantity - ? ... ELSE quantity END
        // WHERE id IN (...)
        let mut builder = QueryBuilder::<MySql>::new("UPDATE products SET quantity = CASE id");
        for decrement in decrements {
            builder
                .push(" WHEN ")
                .push_bind(decrement.product_id.to_string())
                .push(" THEN quantity - ")
                .push_bind(decrement.quantity);
        }
        builder.push(" ELSE quantity END WHERE id IN (");
        let mut separated = builder.separated(", ");
        for decrement in decrements {
            separated.push_bind(decrement.product_id.to_string());
        }
        separated.push_unseparated(")");

        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_error("在庫の更新に失敗しました", e))?;
        Ok(())
    }

    async fn insert_orders(&mut self, orders: &[Order]) -> Result<(), RepositoryError> {
        for chunk in orders.chunks(ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<MySql>::new(
                "INSERT INTO orders (id, user_id, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut row, order| {
                row.push_bind(order.id().to_string())
                    .push_bind(order.user_id().to_string())
                    .push_bind(order.created_at())
                    .push_bind(order.updated_at());
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| query_error("注文の保存に失敗しました", e))?;
        }
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<(), RepositoryError> {
        for chunk in items.chunks(ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<MySql>::new(
                "INSERT INTO order_items (id, order_id, product_id, price, quantity) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(item.id().to_string())
                    .push_bind(item.order_id().to_string())
                    .push_bind(item.product_id().to_string())
                    .push_bind(item.price().amount())
                    .push_bind(item.quantity());
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| query_error("注文明細の保存に失敗しました", e))?;
        }
        Ok(())
    }

    async fn fetch_orders(&mut self, order_ids: &[OrderId]) -> Result<Vec<Order>, RepositoryError> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<MySql>::new(
            r#"
            SELECT o.id, o.user_id, o.created_at, o.updated_at,
                   i.id AS item_id, i.product_id, i.price, i.quantity
            FROM orders o
            LEFT JOIN order_items i ON i.order_id = o.id
            WHERE o.id IN ("#,
        );
        let mut separated = builder.separated(", ");
        for id in order_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY o.id, i.seq");

        let rows = builder
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| query_error("注文の取得に失敗しました", e))?;

        build_orders_from_rows(&rows)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| query_error("コミットに失敗しました", e))
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| query_error("ロールバックに失敗しました", e))
    }
}

/// JOINされた行から注文を再構築する（行の並び順で注文と明細の順序を保つ）
fn build_orders_from_rows(rows: &[MySqlRow]) -> Result<Vec<Order>, RepositoryError> {
    struct Header {
        id: OrderId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    }

    let mut headers: Vec<Header> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let id: String = row
            .try_get("id")
            .map_err(|e| decode_error("注文IDの取得に失敗しました", e))?;
        let position = match index_by_id.get(&id) {
            Some(position) => *position,
            None => {
                let order_id = OrderId::from_string(&id)
                    .map_err(|e| decode_error("注文IDの解析に失敗しました", e))?;
                let user_id: String = row
                    .try_get("user_id")
                    .map_err(|e| decode_error("ユーザーIDの取得に失敗しました", e))?;
                let user_id = UserId::from_string(&user_id)
                    .map_err(|e| decode_error("ユーザーIDの解析に失敗しました", e))?;
                headers.push(Header {
                    id: order_id,
                    user_id,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| decode_error("作成日時の取得に失敗しました", e))?,
                    updated_at: row
                        .try_get("updated_at")
                        .map_err(|e| decode_error("更新日時の取得に失敗しました", e))?,
                    items: Vec::new(),
                });
                index_by_id.insert(id, headers.len() - 1);
                headers.len() - 1
            }
        };

        let item_id: Option<String> = row
            .try_get("item_id")
            .map_err(|e| decode_error("明細IDの取得に失敗しました", e))?;
        let Some(item_id) = item_id else {
            continue;
        };
        let header = &mut headers[position];
        let product_id: String = row
            .try_get("product_id")
            .map_err(|e| decode_error("商品IDの取得に失敗しました", e))?;
        let price: Decimal = row
            .try_get("price")
            .map_err(|e| decode_error("価格の取得に失敗しました", e))?;
        let quantity: u32 = row
            .try_get("quantity")
            .map_err(|e| decode_error("数量の取得に失敗しました", e))?;

        let item = OrderItem::new(
            OrderItemId::from_string(&item_id)
                .map_err(|e| decode_error("明細IDの解析に失敗しました", e))?,
            header.id,
            ProductId::from_string(&product_id)
                .map_err(|e| decode_error("商品IDの解析に失敗しました", e))?,
            Money::new(price).map_err(|e| decode_error("金額の構築に失敗しました", e))?,
            quantity,
        )
        .map_err(|e| decode_error("注文明細の構築に失敗しました", e))?;
        header.items.push(item);
    }

    Ok(headers
        .into_iter()
        .map(|h| Order::reconstruct(h.id, h.user_id, h.items, h.created_at, h.updated_at))
        .collect())
}
