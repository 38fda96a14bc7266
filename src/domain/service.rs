// ドメインサービス
// バッチ内の需要集約と超過販売の解決を実装
// I/Oを持たない純粋な計算で、トランザクション管理はアプリケーション層が担当する

use crate::domain::model::{CheckoutRequest, OrderItem, ProductId, ProductStock};
use crate::domain::port::StockDecrement;
use std::collections::{BTreeMap, HashMap};

/// バッチ内での明細の位置
/// `request` はバッチ内の要求番号、`item` はその要求内の明細番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPosition {
    pub request: usize,
    pub item: usize,
}

/// 超過販売時にどの明細から取り除くかの方針
///
/// 現在の方針はバッチ全体での後着順（最後に追加された明細から取り除く）。
/// 要求ごとの公平性は考慮しない。最小数量優先や按分などに変えると
/// 観測される結果が変わるため、変更する場合は明示すること。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    LastInFirstEvicted,
}

/// 商品ごとの集約需要
/// 1バッチの間だけ存在し、ティックごとに作り直される
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedDemand {
    quantity: u64,
    contributors: Vec<(ItemPosition, u32)>,
}

impl MergedDemand {
    /// 要求数量の合計
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// 寄与している明細（到着順）
    pub fn contributors(&self) -> impl Iterator<Item = ItemPosition> + '_ {
        self.contributors.iter().map(|(position, _)| *position)
    }

    fn push(&mut self, position: ItemPosition, quantity: u32) {
        self.quantity += u64::from(quantity);
        self.contributors.push((position, quantity));
    }

    fn pop(&mut self) -> Option<ItemPosition> {
        let (position, quantity) = self.contributors.pop()?;
        self.quantity -= u64::from(quantity);
        Some(position)
    }

    fn clear(&mut self) -> Vec<ItemPosition> {
        self.quantity = 0;
        self.contributors
            .drain(..)
            .map(|(position, _)| position)
            .collect()
    }
}

/// バッチ全体の需要台帳
/// 商品IDの昇順で保持するため、同じ入力順なら解決結果は毎回同じになる
#[derive(Debug, Clone, Default)]
pub struct DemandLedger {
    demands: BTreeMap<ProductId, MergedDemand>,
    item_counts: Vec<usize>,
}

impl DemandLedger {
    /// バッチ順に要求を走査して商品ごとに需要を集約する
    pub fn merge(requests: &[CheckoutRequest]) -> Self {
        let mut demands: BTreeMap<ProductId, MergedDemand> = BTreeMap::new();
        let mut item_counts = Vec::with_capacity(requests.len());

        for (request_index, request) in requests.iter().enumerate() {
            for (item_index, item) in request.items().iter().enumerate() {
                let position = ItemPosition {
                    request: request_index,
                    item: item_index,
                };
                demands
                    .entry(item.product_id())
                    .or_default()
                    .push(position, item.quantity());
            }
            item_counts.push(request.items().len());
        }

        Self {
            demands,
            item_counts,
        }
    }

    /// バッチが参照する商品ID（昇順）
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.demands.keys().copied().collect()
    }

    /// 商品の集約需要を取得
    pub fn demand(&self, product_id: ProductId) -> Option<&MergedDemand> {
        self.demands.get(&product_id)
    }

    /// 在庫に収まるまで需要を削る
    ///
    /// 商品ごとに独立して処理する:
    /// - 在庫が0（在庫行なしを含む）なら、その商品の明細をすべて取り除く
    /// - それ以外は、需要が在庫を超えている間、方針に従って明細を1件ずつ取り除く
    ///
    /// 取り除いた数量は必ず1件の明細の数量と一致するので、需要の合計は
    /// 生き残った明細の数量の合計と常に等しい。
    pub fn resolve(self, stock: &[ProductStock], policy: EvictionPolicy) -> Resolution {
        let stock_by_product: HashMap<ProductId, u32> = stock
            .iter()
            .map(|s| (s.product_id(), s.quantity()))
            .collect();

        let mut survivors: Vec<Vec<bool>> = self
            .item_counts
            .iter()
            .map(|count| vec![true; *count])
            .collect();
        let mut demands = self.demands;
        let mut evicted_items = 0usize;

        for (product_id, demand) in demands.iter_mut() {
            let available = stock_by_product.get(product_id).copied().unwrap_or(0);

            if available == 0 {
                for position in demand.clear() {
                    survivors[position.request][position.item] = false;
                    evicted_items += 1;
                }
                continue;
            }

            match policy {
                EvictionPolicy::LastInFirstEvicted => {
                    while demand.quantity() > u64::from(available) {
                        let Some(position) = demand.pop() else {
                            break;
                        };
                        survivors[position.request][position.item] = false;
                        evicted_items += 1;
                    }
                }
            }
        }

        Resolution {
            demands,
            survivors,
            evicted_items,
        }
    }
}

/// 超過販売解決の結果
#[derive(Debug, Clone)]
pub struct Resolution {
    demands: BTreeMap<ProductId, MergedDemand>,
    survivors: Vec<Vec<bool>>,
    evicted_items: usize,
}

impl Resolution {
    /// 解決後の商品ごとの需要
    pub fn final_quantity(&self, product_id: ProductId) -> u64 {
        self.demands
            .get(&product_id)
            .map(MergedDemand::quantity)
            .unwrap_or(0)
    }

    /// 在庫の一括減算内容（バッチが参照した全商品、商品IDの昇順）
    pub fn decrements(&self) -> Vec<StockDecrement> {
        self.demands
            .iter()
            .map(|(product_id, demand)| StockDecrement {
                product_id: *product_id,
                // 解決後の需要は在庫数（u32）以下
                quantity: u32::try_from(demand.quantity()).unwrap_or(u32::MAX),
            })
            .collect()
    }

    /// 明細が取り除かれたかどうか
    pub fn is_evicted(&self, position: ItemPosition) -> bool {
        !self
            .survivors
            .get(position.request)
            .and_then(|items| items.get(position.item))
            .copied()
            .unwrap_or(false)
    }

    /// 取り除かれた明細の件数
    pub fn evicted_items(&self) -> usize {
        self.evicted_items
    }

    /// 要求の生き残った明細を元の順序で返す
    pub fn surviving_items(
        &self,
        request_index: usize,
        request: &CheckoutRequest,
    ) -> Vec<OrderItem> {
        let Some(mask) = self.survivors.get(request_index) else {
            return Vec::new();
        };
        request
            .items()
            .iter()
            .zip(mask.iter())
            .filter(|(_, alive)| **alive)
            .map(|(item, _)| item.clone())
            .collect()
    }
}
