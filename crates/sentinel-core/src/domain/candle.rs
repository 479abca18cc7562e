//! OHLCV 캔들.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, Quantity};

/// 완성된 OHLCV 캔들. 형성된 뒤에는 바뀌지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시간
    pub time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    #[serde(default)]
    pub volume: Quantity,
}

impl Candle {
    /// 새 캔들을 생성합니다.
    pub fn new(
        time: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 몸통 크기(절대값).
    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// 고가 - 저가.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉 여부.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 음봉 여부.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// 가격 구조가 유효한지 확인합니다 (low ≤ open/close ≤ high).
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.high
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
    }
}
