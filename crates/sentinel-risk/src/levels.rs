//! 브로커 제한과 손절/목표 배치 검증.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{Price, Side, SymbolSpec};

use crate::error::{RiskError, RiskResult};

/// 브로커 최소 거리 위에 더하는 안전 tick 수.
pub const BROKER_SAFETY_TICKS: u32 = 2;

/// 브로커 최소 거리 적용 결과.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrokerAdjustedLevels {
    pub stop: Price,
    pub target: Price,
    /// 둘 중 하나라도 조정되었는지
    pub adjusted: bool,
}

/// 손절/목표 거리가 브로커 최소 거리보다 짧으면 최소 거리 + 2 tick 만큼 밀어냅니다.
pub fn enforce_broker_min_stops(
    side: Side,
    entry: Price,
    stop: Price,
    target: Price,
    spec: &SymbolSpec,
) -> BrokerAdjustedLevels {
    let min_distance = spec.min_stop_distance;
    if min_distance <= Decimal::ZERO {
        return BrokerAdjustedLevels {
            stop,
            target,
            adjusted: false,
        };
    }

    let pushed = min_distance + spec.tick_size * Decimal::from(BROKER_SAFETY_TICKS);
    let mut levels = BrokerAdjustedLevels {
        stop,
        target,
        adjusted: false,
    };

    if side.risk_distance(entry, stop) < min_distance {
        levels.stop = spec.round_away_from(side.stop_from(entry, pushed), entry);
        levels.adjusted = true;
    }
    if side.reward_distance(entry, target) < min_distance {
        levels.target = spec.round_away_from(side.target_from(entry, pushed), entry);
        levels.adjusted = true;
    }

    if levels.adjusted {
        tracing::info!(
            symbol = %spec.symbol,
            side = %side,
            min_stop_distance = %min_distance,
            stop = %levels.stop,
            target = %levels.target,
            "Levels pushed out to broker minimum stop distance"
        );
    }

    levels
}

/// 손절/목표가 진입가의 올바른 쪽에 있는지 검증합니다.
///
/// 매수는 `stop < entry < target`, 매도는 `target < entry < stop`이어야 합니다.
pub fn validate_levels(side: Side, entry: Price, stop: Price, target: Price) -> RiskResult<()> {
    let valid = match side {
        Side::Buy => stop < entry && entry < target,
        Side::Sell => target < entry && entry < stop,
    };

    if valid {
        Ok(())
    } else {
        Err(RiskError::InvalidGeometry(format!(
            "{} requires {}, got stop={} entry={} target={}",
            side,
            match side {
                Side::Buy => "stop < entry < target",
                Side::Sell => "target < entry < stop",
            },
            stop,
            entry,
            target
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_no_broker_minimum_is_noop() {
        let spec = SymbolSpec::forex("EURUSD");
        let levels =
            enforce_broker_min_stops(Side::Buy, dec!(1.2000), dec!(1.1999), dec!(1.2001), &spec);
        assert!(!levels.adjusted);
        assert_eq!(levels.stop, dec!(1.1999));
    }

    #[test]
    fn test_push_out_to_broker_minimum() {
        let spec = SymbolSpec::forex("EURUSD").with_min_stop_distance(dec!(0.0010));

        let levels =
            enforce_broker_min_stops(Side::Sell, dec!(1.2000), dec!(1.2005), dec!(1.1950), &spec);
        assert!(levels.adjusted);
        // 10 pip + 2 tick(0.00002)
        assert_eq!(levels.stop, dec!(1.20102));
        assert_eq!(levels.target, dec!(1.1950));
    }

    #[test]
    fn test_off_tick_broker_minimum_is_rounded_outward() {
        // 브로커가 호가 단위에 맞지 않는 최소 거리를 보고하는 경우
        let spec = SymbolSpec::forex("EURUSD").with_min_stop_distance(dec!(0.000937));

        let levels =
            enforce_broker_min_stops(Side::Buy, dec!(1.2000), dec!(1.1995), dec!(1.2005), &spec);
        assert_eq!(levels.stop, dec!(1.19904));
        assert_eq!(levels.target, dec!(1.20096));
        assert!(spec.is_on_tick(levels.stop) && spec.is_on_tick(levels.target));
    }

    #[test]
    fn test_validate_levels() {
        assert!(validate_levels(Side::Buy, dec!(1.2000), dec!(1.1950), dec!(1.2100)).is_ok());
        assert!(validate_levels(Side::Sell, dec!(1.2000), dec!(1.2050), dec!(1.1900)).is_ok());

        let err = validate_levels(Side::Sell, dec!(1.2000), dec!(1.1950), dec!(1.1900)).unwrap_err();
        assert!(matches!(err, RiskError::InvalidGeometry(_)));
        assert!(err.to_string().contains("target < entry < stop"));

        // 진입가와 같은 손절도 거부
        assert!(validate_levels(Side::Buy, dec!(1.2000), dec!(1.2000), dec!(1.2100)).is_err());
    }
}
