// アプリケーション層
// チェックアウトの受付・バッチ化・処理・結果配信のユースケース

pub mod error;
pub mod service;

pub use error::CheckoutError;
