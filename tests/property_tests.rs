use chrono::Utc;
use order_checkout_batching::domain::model::{
    CheckoutRequest, Money, OrderId, OrderItem, OrderItemId, ProductId, ProductStock, UserId,
};
use order_checkout_batching::domain::service::{DemandLedger, EvictionPolicy, ItemPosition};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

const PRODUCTS: usize = 4;

// テスト用の商品ID（プロパティごとに固定）
fn product_ids() -> Vec<ProductId> {
    (0..PRODUCTS)
        .map(|i| ProductId::from_uuid(Uuid::from_u128(i as u128 + 1)))
        .collect()
}

// (商品番号, 数量) の明細を持つ要求のリスト
fn batch_strategy() -> impl Strategy<Value = Vec<Vec<(usize, u32)>>> {
    prop::collection::vec(
        prop::collection::vec((0..PRODUCTS, 1u32..10), 1..5),
        1..10,
    )
}

// 商品ごとの在庫（None は在庫行なし）
fn stock_strategy() -> impl Strategy<Value = Vec<Option<u32>>> {
    prop::collection::vec(prop::option::weighted(0.9, 0u32..25), PRODUCTS)
}

fn build_requests(batch: &[Vec<(usize, u32)>], products: &[ProductId]) -> Vec<CheckoutRequest> {
    let now = Utc::now();
    batch
        .iter()
        .map(|lines| {
            let order_id = OrderId::new();
            let items = lines
                .iter()
                .map(|(product, quantity)| {
                    OrderItem::new(
                        OrderItemId::new(),
                        order_id,
                        products[*product],
                        Money::new(Decimal::new(199, 2)).unwrap(),
                        *quantity,
                    )
                    .unwrap()
                })
                .collect();
            CheckoutRequest::new(order_id, UserId::new(), items, now, now, Uuid::new_v4()).unwrap()
        })
        .collect()
}

fn build_stock(stock: &[Option<u32>], products: &[ProductId]) -> Vec<ProductStock> {
    stock
        .iter()
        .zip(products)
        .filter_map(|(quantity, id)| quantity.map(|q| ProductStock::new(*id, q)))
        .collect()
}

// 超過販売解決のプロパティベーステスト
proptest! {
    /// 解決後の需要は在庫数を超えない（在庫行がなければ0）
    #[test]
    fn test_resolution_never_oversells(batch in batch_strategy(), stock in stock_strategy()) {
        let products = product_ids();
        let requests = build_requests(&batch, &products);
        let resolution = DemandLedger::merge(&requests)
            .resolve(&build_stock(&stock, &products), EvictionPolicy::default());

        for (index, id) in products.iter().enumerate() {
            let available = u64::from(stock[index].unwrap_or(0));
            prop_assert!(resolution.final_quantity(*id) <= available);
        }
    }

    /// 解決後の需要は生き残った明細の数量の合計と等しい
    #[test]
    fn test_resolution_conserves_quantity(batch in batch_strategy(), stock in stock_strategy()) {
        let products = product_ids();
        let requests = build_requests(&batch, &products);
        let resolution = DemandLedger::merge(&requests)
            .resolve(&build_stock(&stock, &products), EvictionPolicy::default());

        let mut surviving: HashMap<ProductId, u64> = HashMap::new();
        let mut survivor_count = 0;
        for (index, request) in requests.iter().enumerate() {
            for item in resolution.surviving_items(index, request) {
                *surviving.entry(item.product_id()).or_default() += u64::from(item.quantity());
                survivor_count += 1;
            }
        }

        for id in &products {
            let expected = surviving.get(id).copied().unwrap_or(0);
            prop_assert_eq!(resolution.final_quantity(*id), expected);
        }
        let total_items: usize = requests.iter().map(|r| r.items().len()).sum();
        prop_assert_eq!(total_items, survivor_count + resolution.evicted_items());
    }

    /// 商品ごとに、取り除かれる明細は到着順の末尾に連続する（後着順）
    #[test]
    fn test_eviction_is_last_in_first_evicted(
        batch in batch_strategy(),
        stock in stock_strategy(),
    ) {
        let products = product_ids();
        let requests = build_requests(&batch, &products);
        let ledger = DemandLedger::merge(&requests);
        let contributors: HashMap<ProductId, Vec<ItemPosition>> = products
            .iter()
            .filter_map(|id| ledger.demand(*id).map(|d| (*id, d.contributors().collect())))
            .collect();
        let resolution = ledger.resolve(&build_stock(&stock, &products), EvictionPolicy::default());

        for positions in contributors.values() {
            let mut evicted_seen = false;
            for position in positions {
                let evicted = resolution.is_evicted(*position);
                prop_assert!(!(evicted_seen && !evicted), "survivor after an evicted item");
                evicted_seen |= evicted;
            }
        }
    }

    /// 需要が在庫以内なら何も取り除かれない
    #[test]
    fn test_no_eviction_when_stock_suffices(batch in batch_strategy()) {
        let products = product_ids();
        let requests = build_requests(&batch, &products);
        let stock: Vec<ProductStock> =
            products.iter().map(|id| ProductStock::new(*id, 1_000)).collect();
        let resolution = DemandLedger::merge(&requests).resolve(&stock, EvictionPolicy::default());

        prop_assert_eq!(resolution.evicted_items(), 0);
        for (index, request) in requests.iter().enumerate() {
            let survivors = resolution.surviving_items(index, request);
            prop_assert_eq!(survivors.len(), request.items().len());
        }
    }

    /// 減算対象はバッチが参照した商品だけ
    #[test]
    fn test_decrements_cover_only_touched_products(
        batch in batch_strategy(),
        stock in stock_strategy(),
    ) {
        let products = product_ids();
        let requests = build_requests(&batch, &products);
        let ledger = DemandLedger::merge(&requests);
        let touched = ledger.product_ids();
        let resolution = ledger.resolve(&build_stock(&stock, &products), EvictionPolicy::default());

        let decremented: Vec<ProductId> =
            resolution.decrements().iter().map(|d| d.product_id).collect();
        prop_assert_eq!(decremented, touched);
    }
}

// Money のプロパティベーステスト
proptest! {
    /// 小計は単価 × 数量と等しく、小数点以下の誤差がない
    #[test]
    fn test_subtotal_is_exact(cents in 0i64..10_000_000, quantity in 1u32..1_000) {
        let price = Money::new(Decimal::new(cents, 2)).unwrap();
        let item =
            OrderItem::new(OrderItemId::new(), OrderId::new(), ProductId::new(), price, quantity)
                .unwrap();
        let expected = Decimal::new(cents, 2) * Decimal::from(quantity);
        prop_assert_eq!(item.subtotal().unwrap().amount(), expected);
    }

    /// 負の金額は拒否される
    #[test]
    fn test_negative_money_rejected(cents in 1i64..10_000_000) {
        prop_assert!(Money::new(Decimal::new(-cents, 2)).is_err());
    }
}
