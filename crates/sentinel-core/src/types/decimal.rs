//! 가격/수량 계산을 위한 Decimal 유틸리티.
//!
//! 가격과 수량은 `Decimal`로, 비율·퍼센트·점수는 `f64`로 다룹니다.
//! 두 세계를 오가는 변환은 이 모듈의 헬퍼만 사용합니다.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// 가격 타입.
pub type Price = Decimal;

/// 거래량(lot) 타입.
pub type Quantity = Decimal;

/// `f64`를 `Decimal`로 변환합니다. 표현할 수 없는 값(NaN, 무한대)은 0입니다.
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// `f64`로 변환합니다. 실패하면 0.0입니다.
    fn to_f64_lossy(&self) -> f64;

    /// `step` 단위로 내림합니다. `step`이 0 이하이면 그대로 반환합니다.
    fn floor_to_step(&self, step: Decimal) -> Decimal;

    /// `f64` 배율을 곱합니다.
    fn mul_f64(&self, factor: f64) -> Decimal;
}

impl DecimalExt for Decimal {
    fn to_f64_lossy(&self) -> f64 {
        self.to_f64().unwrap_or(0.0)
    }

    fn floor_to_step(&self, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return *self;
        }
        (*self / step).floor() * step
    }

    fn mul_f64(&self, factor: f64) -> Decimal {
        *self * decimal_from_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_floor_to_step() {
        assert_eq!(dec!(0.155).floor_to_step(dec!(0.01)), dec!(0.15));
        assert_eq!(dec!(0.005).floor_to_step(dec!(0.01)), dec!(0));
        assert_eq!(dec!(1.23).floor_to_step(Decimal::ZERO), dec!(1.23));
    }

    #[test]
    fn test_mul_f64_and_conversion() {
        assert_eq!(dec!(0.0010).mul_f64(1.5), dec!(0.0015));
        assert_eq!(decimal_from_f64(f64::NAN), Decimal::ZERO);
        assert!((dec!(1.25).to_f64_lossy() - 1.25).abs() < 1e-12);
    }
}
