//! 심볼 사양과 pip 규칙.
//!
//! 외환 심볼의 pip 크기, 최소 손절 거리, 금액↔가격거리 변환을 정의합니다.
//! 브로커가 사양을 제공하면 그것을 우선하고, 없을 때만 기본 규칙을 사용합니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{DecimalExt, Price, Quantity};

/// JPY 호가 심볼의 최소 손절 거리 (pip).
pub const JPY_MIN_STOP_PIPS: u32 = 15;
/// 그 외 심볼의 최소 손절 거리 (pip).
pub const DEFAULT_MIN_STOP_PIPS: u32 = 10;

/// 엔화 호가 심볼인지 확인합니다 (예: USDJPY, EURJPY.m).
pub fn is_jpy_quoted(symbol: &str) -> bool {
    symbol.to_uppercase().contains("JPY")
}

/// 심볼의 기본 pip 크기.
pub fn default_pip_size(symbol: &str) -> Price {
    if is_jpy_quoted(symbol) {
        dec!(0.01)
    } else {
        dec!(0.0001)
    }
}

/// 심볼 등급별 최소 손절 거리 (pip 단위).
pub fn min_stop_pips(symbol: &str) -> Decimal {
    if is_jpy_quoted(symbol) {
        Decimal::from(JPY_MIN_STOP_PIPS)
    } else {
        Decimal::from(DEFAULT_MIN_STOP_PIPS)
    }
}

/// 호가 단위 라운딩 방법.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMethod {
    /// 반올림
    Round,
    /// 내림
    Floor,
    /// 올림
    Ceil,
}

/// 브로커가 보고하는 심볼 사양.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// 심볼
    pub symbol: String,
    /// pip 크기 (가격 단위)
    pub pip_size: Price,
    /// 최소 호가 단위
    pub tick_size: Price,
    /// 1 lot 기준 tick 1개의 계좌 통화 가치
    pub tick_value: Decimal,
    /// 1 lot 계약 크기
    pub contract_size: Decimal,
    /// 브로커 최소 손절 거리 (가격 단위)
    #[serde(default)]
    pub min_stop_distance: Price,
    /// 최소 거래량
    pub min_volume: Quantity,
    /// 거래량 단위
    pub volume_step: Quantity,
}

impl SymbolSpec {
    /// 표준 외환 계약(100,000 단위, 5자리 호가)을 가정한 사양을 생성합니다.
    pub fn forex(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let pip_size = default_pip_size(&symbol);
        Self {
            pip_size,
            tick_size: pip_size / Decimal::TEN,
            tick_value: Decimal::ONE,
            contract_size: dec!(100000),
            min_stop_distance: Decimal::ZERO,
            min_volume: dec!(0.01),
            volume_step: dec!(0.01),
            symbol,
        }
    }

    /// 브로커 최소 손절 거리를 설정합니다.
    pub fn with_min_stop_distance(mut self, distance: Price) -> Self {
        self.min_stop_distance = distance;
        self
    }

    /// pip 수를 가격 거리로 변환합니다.
    pub fn pips_to_price(&self, pips: Decimal) -> Price {
        pips * self.pip_size
    }

    /// 가격 거리를 pip 수로 변환합니다.
    pub fn price_to_pips(&self, distance: Price) -> Decimal {
        if self.pip_size.is_zero() {
            return Decimal::ZERO;
        }
        distance / self.pip_size
    }

    /// 1 lot 기준 pip 가치 (계좌 통화).
    ///
    /// tick 가치가 없으면 계약 크기 × pip 크기(호가 통화 기준)로 대신합니다.
    pub fn pip_value_per_lot(&self) -> Decimal {
        if self.tick_size.is_zero() || self.tick_value.is_zero() {
            return self.contract_size * self.pip_size;
        }
        self.tick_value * self.pip_size / self.tick_size
    }

    /// 주어진 거래량에서 `amount` 만큼의 손익이 나는 가격 거리.
    ///
    /// 거래량이나 pip 가치가 0이면 `None`입니다.
    pub fn price_distance_for_amount(&self, amount: Decimal, volume: Quantity) -> Option<Price> {
        let pip_value = self.pip_value_per_lot() * volume;
        if pip_value <= Decimal::ZERO || self.pip_size.is_zero() {
            return None;
        }
        Some(amount / pip_value * self.pip_size)
    }

    /// 가격을 최소 호가 단위로 라운딩합니다. 호가 단위가 0이면 그대로 둡니다.
    pub fn round_to_tick(&self, price: Price, method: RoundMethod) -> Price {
        if self.tick_size <= Decimal::ZERO {
            return price;
        }

        let ticks = price / self.tick_size;
        let rounded_ticks = match method {
            RoundMethod::Round => ticks.round(),
            RoundMethod::Floor => ticks.floor(),
            RoundMethod::Ceil => ticks.ceil(),
        };

        rounded_ticks * self.tick_size
    }

    /// `anchor`에서 멀어지는 쪽으로 호가 단위에 맞춥니다.
    ///
    /// 진입가를 기준으로 쓰면 손절/목표 거리가 줄어들지 않습니다.
    pub fn round_away_from(&self, price: Price, anchor: Price) -> Price {
        let method = match price.cmp(&anchor) {
            std::cmp::Ordering::Less => RoundMethod::Floor,
            std::cmp::Ordering::Greater => RoundMethod::Ceil,
            std::cmp::Ordering::Equal => RoundMethod::Round,
        };
        self.round_to_tick(price, method)
    }

    /// 가격이 호가 단위에 맞는지 확인합니다.
    pub fn is_on_tick(&self, price: Price) -> bool {
        self.tick_size <= Decimal::ZERO || (price % self.tick_size).is_zero()
    }

    /// 거래량을 거래량 단위로 내림합니다.
    pub fn normalize_volume(&self, volume: Quantity) -> Quantity {
        volume.floor_to_step(self.volume_step)
    }
}
