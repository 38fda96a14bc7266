use crate::domain::model::ProductId;

/// 商品在庫
/// トランザクション時点で読み取った利用可能数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductStock {
    product_id: ProductId,
    quantity: u32,
}

impl ProductStock {
    /// 新しい在庫情報を作成
    ///
    /// # Arguments
    /// * `product_id` - 商品ID
    /// * `quantity` - 利用可能数量
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// 商品IDを取得
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// 利用可能数量を取得
    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}
