use crate::domain::error::DomainError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// UUIDを内包する識別子型を定義する
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// 新しい一意のIDを生成
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// UUIDから作成
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// 文字列から作成
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                let uuid = Uuid::parse_str(s)?;
                Ok(Self(uuid))
            }

            /// 内部のUUIDを取得
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

uuid_identifier!(
    /// 注文の一意識別子
    OrderId
);

uuid_identifier!(
    /// 注文明細の一意識別子
    OrderItemId
);

uuid_identifier!(
    /// 利用者の一意識別子
    UserId
);

uuid_identifier!(
    /// 商品の一意識別子
    ProductId
);

/// 金額を表す値オブジェクト
/// 永続化される合計金額に関わるため浮動小数点は使わない
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// 小数点以下の最大桁数（永続化先の DECIMAL(12, 2) に合わせる）
    pub const MAX_SCALE: u32 = 2;

    /// 金額の上限（この値は含まない）
    pub const UPPER_BOUND: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

    /// 金額から作成
    /// 負の金額、小数点以下3桁以上の端数、上限以上の金額は受け付けない
    pub fn new(amount: Decimal) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::InvalidValue(format!(
                "金額は0以上である必要があります: {}",
                amount
            )));
        }
        if amount.round_dp(Self::MAX_SCALE) != amount {
            return Err(DomainError::InvalidValue(format!(
                "金額の小数点以下は{}桁までです: {}",
                Self::MAX_SCALE,
                amount
            )));
        }
        if amount >= Self::UPPER_BOUND {
            return Err(DomainError::InvalidValue(format!(
                "金額は{}未満である必要があります: {}",
                Self::UPPER_BOUND,
                amount
            )));
        }
        Ok(Self(amount))
    }

    /// 0円
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// 金額を取得
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// 金額を加算
    /// 合計は上限を超えてよいが、Decimal の表現範囲を超える場合はエラー
    pub fn add(&self, other: &Money) -> Result<Money, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| {
                DomainError::InvalidValue(format!(
                    "金額の加算が桁あふれしました: {} + {}",
                    self, other
                ))
            })
    }

    /// 金額を数量倍する
    pub fn multiply(&self, quantity: u32) -> Result<Money, DomainError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(|| {
                DomainError::InvalidValue(format!(
                    "金額の乗算が桁あふれしました: {} × {}",
                    self, quantity
                ))
            })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
