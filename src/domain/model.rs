// ドメインモデル（エンティティと値オブジェクト）

mod inventory;
mod order;
mod value_objects;

pub use value_objects::{Money, OrderId, OrderItemId, ProductId, UserId};

pub use inventory::ProductStock;
pub use order::{CheckoutRequest, Order, OrderItem};
