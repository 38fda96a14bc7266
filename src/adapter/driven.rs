// 駆動される側アダプター（チェックアウトストアの実装）

mod in_memory_checkout_store;
mod mysql_checkout_store;

pub use in_memory_checkout_store::{InMemoryCheckoutStore, InMemoryTransaction, StoreOperation};
pub use mysql_checkout_store::{MySqlCheckoutStore, MySqlCheckoutTransaction};
