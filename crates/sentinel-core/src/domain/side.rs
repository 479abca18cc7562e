//! 거래 방향과 방향별 가격 기하.
//!
//! 손절은 항상 진입가 "뒤"(거래 방향의 반대쪽), 목표는 진입가 "앞"에 놓입니다.
//! 방향에 따라 부호가 바뀌는 계산은 모두 이 타입을 거칩니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// 거래 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// 진입가에서 `distance` 만큼 뒤의 손절 가격.
    pub fn stop_from(&self, entry: Price, distance: Decimal) -> Price {
        match self {
            Side::Buy => entry - distance,
            Side::Sell => entry + distance,
        }
    }

    /// 진입가에서 `distance` 만큼 앞의 목표 가격.
    pub fn target_from(&self, entry: Price, distance: Decimal) -> Price {
        match self {
            Side::Buy => entry + distance,
            Side::Sell => entry - distance,
        }
    }

    /// 방향을 고려한 손절 거리. 손절이 잘못된 쪽에 있으면 0 이하입니다.
    pub fn risk_distance(&self, entry: Price, stop: Price) -> Decimal {
        match self {
            Side::Buy => entry - stop,
            Side::Sell => stop - entry,
        }
    }

    /// 방향을 고려한 목표 거리. 목표가 잘못된 쪽에 있으면 0 이하입니다.
    pub fn reward_distance(&self, entry: Price, target: Price) -> Decimal {
        match self {
            Side::Buy => target - entry,
            Side::Sell => entry - target,
        }
    }

    /// `price`가 진입가 뒤(손절 쪽)에 있는지.
    pub fn is_behind(&self, entry: Price, price: Price) -> bool {
        self.risk_distance(entry, price) > Decimal::ZERO
    }

    /// `price`가 진입가 앞(목표 쪽)에 있는지.
    pub fn is_ahead(&self, entry: Price, price: Price) -> bool {
        self.reward_distance(entry, price) > Decimal::ZERO
    }

    /// `candidate` 손절이 `current`보다 유리한(더 조인) 위치인지.
    pub fn is_tighter_stop(&self, candidate: Price, current: Price) -> bool {
        match self {
            Side::Buy => candidate > current,
            Side::Sell => candidate < current,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "long" => Ok(Side::Buy),
            "sell" | "short" => Ok(Side::Sell),
            _ => Err(format!("Invalid side: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_geometry_buy() {
        let side = Side::Buy;
        assert_eq!(side.stop_from(dec!(1.2000), dec!(0.0050)), dec!(1.1950));
        assert_eq!(side.target_from(dec!(1.2000), dec!(0.0050)), dec!(1.2050));
        assert!(side.is_behind(dec!(1.2000), dec!(1.1990)));
        assert!(!side.is_behind(dec!(1.2000), dec!(1.2000)));
        assert!(side.is_tighter_stop(dec!(1.1960), dec!(1.1950)));
    }

    #[test]
    fn test_side_geometry_sell() {
        let side = Side::Sell;
        assert_eq!(side.stop_from(dec!(1.2000), dec!(0.0050)), dec!(1.2050));
        assert_eq!(side.reward_distance(dec!(1.2000), dec!(1.1900)), dec!(0.0100));
        assert_eq!(side.risk_distance(dec!(1.2000), dec!(1.1990)), dec!(-0.0010));
        assert!(side.is_tighter_stop(dec!(1.2040), dec!(1.2050)));
    }

    #[test]
    fn test_side_parse_and_display() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("short".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
        assert_eq!(Side::Sell.to_string(), "SELL");
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
