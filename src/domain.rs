// ドメイン層
// 注文・在庫のモデル、出力ポート、超過販売解決のドメインサービス

pub mod error;
pub mod model;
pub mod port;
pub mod service;
